use std::sync::Arc;

use crate::common::Result;
use crate::tuple::{Schema, Tuple};

use super::{Operator, Predicate};

/// Passes through the child's tuples that satisfy a predicate.
pub struct Filter {
    predicate: Predicate,
    child: Box<Operator>,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Operator) -> Self {
        Self {
            predicate,
            child: Box::new(child),
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
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
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            if self.predicate.filter(&tuple)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.child.rewind()
    }

    pub(crate) fn close(&mut self) {
        self.child.close();
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        self.child.schema()
    }
}
