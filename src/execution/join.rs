use std::sync::Arc;

use crate::common::Result;
use crate::tuple::{Schema, Tuple};

use super::{JoinPredicate, Operator};

/// Nested-loop join. For every outer tuple the inner child is rewound and
/// scanned in full; matching pairs are emitted as `outer ++ inner`.
pub struct Join {
    predicate: JoinPredicate,
    outer: Box<Operator>,
    inner: Box<Operator>,
    schema: Arc<Schema>,
    /// Outer tuple currently being matched
    current_outer: Option<Tuple>,
}

impl Join {
    pub fn new(predicate: JoinPredicate, outer: Operator, inner: Operator) -> Self {
        let schema = Arc::new(Schema::merge(outer.schema(), inner.schema()));
        Self {
            predicate,
            outer: Box::new(outer),
            inner: Box::new(inner),
            schema,
            current_outer: None,
        }
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    pub(crate) fn outer(&self) -> &Operator {
        &self.outer
    }

    pub(crate) fn inner(&self) -> &Operator {
        &self.inner
    }

    /// Swaps in new children. The output schema is re-derived from whichever
    /// pair is in place afterwards.
    pub(crate) fn set_children(&mut self, outer: Option<Operator>, inner: Option<Operator>) {
        if let Some(outer) = outer {
            self.outer = Box::new(outer);
        }
        if let Some(inner) = inner {
            self.inner = Box::new(inner);
        }
        self.schema = Arc::new(Schema::merge(self.outer.schema(), self.inner.schema()));
        self.current_outer = None;
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.current_outer = None;
        self.outer.open()?;
        self.inner.open()
    }

    pub(crate) fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            let outer = match self.current_outer.take() {
                Some(tuple) => tuple,
                None => {
                    if !self.outer.has_next()? {
                        return Ok(None);
                    }
                    self.inner.rewind()?;
                    self.outer.next()?
                }
            };

            while self.inner.has_next()? {
                let inner = self.inner.next()?;
                if self.predicate.filter(&outer, &inner)? {
                    let joined = Tuple::concat(Arc::clone(&self.schema), &outer, &inner);
                    self.current_outer = Some(outer);
                    return Ok(Some(joined));
                }
            }
        }
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.current_outer = None;
        self.outer.rewind()?;
        self.inner.rewind()
    }

    pub(crate) fn close(&mut self) {
        self.current_outer = None;
        self.outer.close();
        self.inner.close();
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{CompareOp, DataType, Field};

    fn source(name: &str, values: &[i32]) -> Operator {
        let schema = Schema::builder().column(name, DataType::Int).build_arc();
        let tuples = values
            .iter()
            .map(|&v| Tuple::new(schema.clone(), vec![Field::Int(v)]).unwrap())
            .collect();
        Operator::values(schema, tuples).unwrap()
    }

    #[test]
    fn test_equi_join() {
        let mut join = Operator::join(
            JoinPredicate::new(0, CompareOp::Equals, 0),
            source("a", &[1, 2, 3, 2]),
            source("b", &[2, 3, 4]),
        );
        join.open().unwrap();
        let pairs: Vec<(i32, i32)> = join
            .fetch_all()
            .unwrap()
            .iter()
            .map(|t| {
                (
                    t.field(0).unwrap().as_int().unwrap(),
                    t.field(1).unwrap().as_int().unwrap(),
                )
            })
            .collect();
        assert_eq!(pairs, vec![(2, 2), (3, 3), (2, 2)]);
        assert_eq!(join.schema().field_name_to_index("b").unwrap(), 1);
    }

    #[test]
    fn test_inequality_join_and_rewind() {
        let mut join = Operator::join(
            JoinPredicate::new(0, CompareOp::LessThan, 0),
            source("a", &[1, 2]),
            source("b", &[1, 2, 3]),
        );
        join.open().unwrap();
        // 1 < {2, 3}, 2 < {3}
        assert_eq!(join.fetch_all().unwrap().len(), 3);
        join.rewind().unwrap();
        assert_eq!(join.fetch_all().unwrap().len(), 3);
    }

    #[test]
    fn test_schema_follows_replaced_children() {
        let mut join = Operator::join(
            JoinPredicate::new(0, CompareOp::Equals, 0),
            source("a", &[1]),
            source("b", &[1]),
        );
        assert_eq!(join.schema().column_count(), 2);

        let pair = |left: &str, right: &str, rows: &[(i32, i32)]| {
            let schema = Schema::builder()
                .column(left, DataType::Int)
                .column(right, DataType::Int)
                .build_arc();
            let tuples = rows
                .iter()
                .map(|&(l, r)| Tuple::new(schema.clone(), vec![l.into(), r.into()]).unwrap())
                .collect();
            Operator::values(schema, tuples).unwrap()
        };
        join.set_children(vec![
            pair("a", "x", &[(1, 10), (2, 20)]),
            pair("b", "y", &[(2, 200)]),
        ])
        .unwrap();
        assert_eq!(join.schema().column_count(), 4);
        assert_eq!(join.schema().field_name_to_index("y").unwrap(), 3);

        join.open().unwrap();
        let rows = join.fetch_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), join.schema().column_count());
        assert_eq!(rows[0].field(3).unwrap(), &Field::Int(200));
    }

    #[test]
    fn test_empty_inner() {
        let mut join = Operator::join(
            JoinPredicate::new(0, CompareOp::Equals, 0),
            source("a", &[1, 2]),
            source("b", &[]),
        );
        join.open().unwrap();
        assert!(!join.has_next().unwrap());
    }
}
