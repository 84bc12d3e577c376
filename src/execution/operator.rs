use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::{DbError, Result, TableId, TransactionId};
use crate::tuple::{Schema, Tuple};

use super::{
    Aggregate, AggregateOp, Delete, Filter, Insert, Join, JoinPredicate, Predicate, SeqScan,
    Values,
};

/// The closed set of plan nodes.
pub enum PlanNode {
    SeqScan(SeqScan),
    Filter(Filter),
    Join(Join),
    Aggregate(Aggregate),
    Insert(Insert),
    Delete(Delete),
    Values(Values),
}

impl PlanNode {
    fn open(&mut self) -> Result<()> {
        match self {
            PlanNode::SeqScan(n) => n.open(),
            PlanNode::Filter(n) => n.open(),
            PlanNode::Join(n) => n.open(),
            PlanNode::Aggregate(n) => n.open(),
            PlanNode::Insert(n) => n.open(),
            PlanNode::Delete(n) => n.open(),
            PlanNode::Values(n) => n.open(),
        }
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        match self {
            PlanNode::SeqScan(n) => n.fetch_next(),
            PlanNode::Filter(n) => n.fetch_next(),
            PlanNode::Join(n) => n.fetch_next(),
            PlanNode::Aggregate(n) => n.fetch_next(),
            PlanNode::Insert(n) => n.fetch_next(),
            PlanNode::Delete(n) => n.fetch_next(),
            PlanNode::Values(n) => n.fetch_next(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        match self {
            PlanNode::SeqScan(n) => n.rewind(),
            PlanNode::Filter(n) => n.rewind(),
            PlanNode::Join(n) => n.rewind(),
            PlanNode::Aggregate(n) => n.rewind(),
            PlanNode::Insert(n) => n.rewind(),
            PlanNode::Delete(n) => n.rewind(),
            PlanNode::Values(n) => n.rewind(),
        }
    }

    fn close(&mut self) {
        match self {
            PlanNode::SeqScan(n) => n.close(),
            PlanNode::Filter(n) => n.close(),
            PlanNode::Join(n) => n.close(),
            PlanNode::Aggregate(n) => n.close(),
            PlanNode::Insert(n) => n.close(),
            PlanNode::Delete(n) => n.close(),
            PlanNode::Values(n) => n.close(),
        }
    }

    fn schema(&self) -> &Arc<Schema> {
        match self {
            PlanNode::SeqScan(n) => n.schema(),
            PlanNode::Filter(n) => n.schema(),
            PlanNode::Join(n) => n.schema(),
            PlanNode::Aggregate(n) => n.schema(),
            PlanNode::Insert(n) => n.schema(),
            PlanNode::Delete(n) => n.schema(),
            PlanNode::Values(n) => n.schema(),
        }
    }

    fn children(&self) -> Vec<&Operator> {
        match self {
            PlanNode::SeqScan(_) | PlanNode::Values(_) => Vec::new(),
            PlanNode::Filter(n) => vec![n.child()],
            PlanNode::Join(n) => vec![n.outer(), n.inner()],
            PlanNode::Aggregate(n) => vec![n.child()],
            PlanNode::Insert(n) => vec![n.child()],
            PlanNode::Delete(n) => vec![n.child()],
        }
    }

    /// Hands `children` to the node in order. Missing children leave the
    /// current ones in place and extras are ignored.
    fn set_children(&mut self, children: Vec<Operator>) -> Result<()> {
        let mut children = children.into_iter();
        match self {
            PlanNode::SeqScan(_) | PlanNode::Values(_) => {}
            PlanNode::Filter(n) => {
                if let Some(child) = children.next() {
                    n.set_child(child);
                }
            }
            PlanNode::Join(n) => n.set_children(children.next(), children.next()),
            PlanNode::Aggregate(n) => {
                if let Some(child) = children.next() {
                    n.set_child(child)?;
                }
            }
            PlanNode::Insert(n) => {
                if let Some(child) = children.next() {
                    n.set_child(child)?;
                }
            }
            PlanNode::Delete(n) => {
                if let Some(child) = children.next() {
                    n.set_child(child);
                }
            }
        }
        Ok(())
    }
}

/// A node in a pull-based (Volcano) query plan.
///
/// Drivers call [`open`](Self::open), then alternate [`has_next`](Self::has_next)
/// and [`next`](Self::next) until exhausted. `has_next` fetches one tuple ahead
/// and holds it until `next` hands it out.
pub struct Operator {
    node: PlanNode,
    peeked: Option<Tuple>,
    is_open: bool,
}

impl Operator {
    pub fn new(node: PlanNode) -> Self {
        Self {
            node,
            peeked: None,
            is_open: false,
        }
    }

    /// Full scan of a table. Column names are prefixed with `alias`.
    pub fn seq_scan(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> Result<Self> {
        Ok(Self::new(PlanNode::SeqScan(SeqScan::new(
            pool, tid, table_id, alias,
        )?)))
    }

    pub fn filter(predicate: Predicate, child: Operator) -> Self {
        Self::new(PlanNode::Filter(Filter::new(predicate, child)))
    }

    pub fn join(predicate: JoinPredicate, outer: Operator, inner: Operator) -> Self {
        Self::new(PlanNode::Join(Join::new(predicate, outer, inner)))
    }

    pub fn aggregate(
        child: Operator,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        Ok(Self::new(PlanNode::Aggregate(Aggregate::new(
            child,
            agg_field,
            group_field,
            op,
        )?)))
    }

    pub fn insert(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        child: Operator,
        table_id: TableId,
    ) -> Result<Self> {
        Ok(Self::new(PlanNode::Insert(Insert::new(
            pool, tid, child, table_id,
        )?)))
    }

    pub fn delete(pool: Arc<BufferPool>, tid: TransactionId, child: Operator) -> Self {
        Self::new(PlanNode::Delete(Delete::new(pool, tid, child)))
    }

    pub fn values(schema: Arc<Schema>, tuples: Vec<Tuple>) -> Result<Self> {
        Ok(Self::new(PlanNode::Values(Values::new(schema, tuples)?)))
    }

    pub fn open(&mut self) -> Result<()> {
        self.node.open()?;
        self.peeked = None;
        self.is_open = true;
        Ok(())
    }

    pub fn has_next(&mut self) -> Result<bool> {
        if !self.is_open {
            return Err(DbError::OperatorNotOpen);
        }
        if self.peeked.is_none() {
            self.peeked = self.node.fetch_next()?;
        }
        Ok(self.peeked.is_some())
    }

    /// Returns the next tuple, or `NoSuchElement` once exhausted.
    pub fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        self.peeked.take().ok_or(DbError::NoSuchElement)
    }

    /// Restarts the stream from the beginning.
    pub fn rewind(&mut self) -> Result<()> {
        if !self.is_open {
            return Err(DbError::OperatorNotOpen);
        }
        self.peeked = None;
        self.node.rewind()
    }

    pub fn close(&mut self) {
        self.node.close();
        self.peeked = None;
        self.is_open = false;
    }

    /// Drains every remaining tuple.
    pub fn fetch_all(&mut self) -> Result<Vec<Tuple>> {
        let mut tuples = Vec::new();
        while self.has_next()? {
            tuples.push(self.next()?);
        }
        Ok(tuples)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.node.schema()
    }

    pub fn node(&self) -> &PlanNode {
        &self.node
    }

    pub fn children(&self) -> Vec<&Operator> {
        self.node.children()
    }

    /// Replaces this operator's children in order, re-deriving its output
    /// schema. Fails if the new children do not fit the node, e.g. an
    /// insert source whose column types differ from the table's.
    pub fn set_children(&mut self, children: Vec<Operator>) -> Result<()> {
        self.node.set_children(children)?;
        self.peeked = None;
        Ok(())
    }
}
