use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::common::{Result, TransactionId};
use crate::tuple::{Field, Schema, Tuple};

use super::insert::count_schema;
use super::Operator;

/// Deletes every child tuple, located by record id, and yields one `(count)`
/// tuple. Like [`Insert`](super::Insert) it does its work only once.
pub struct Delete {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<Operator>,
    schema: Arc<Schema>,
    done: bool,
}

impl Delete {
    pub fn new(pool: Arc<BufferPool>, tid: TransactionId, child: Operator) -> Self {
        Self {
            pool,
            tid,
            child: Box::new(child),
            schema: count_schema(),
            done: false,
        }
    }

    pub(crate) fn child(&self) -> &Operator {
        &self.child
    }

    pub(crate) fn set_child(&mut self, child: Operator) {
        self.child = Box::new(child);
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    pub(crate) fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0i32;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.pool.delete_tuple(self.tid, &tuple)?;
            count += 1;
        }
        debug!(tid = %self.tid, count, "deleted tuples");
        Tuple::new(Arc::clone(&self.schema), vec![Field::Int(count)]).map(Some)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.child.rewind()
    }

    pub(crate) fn close(&mut self) {
        self.child.close();
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
