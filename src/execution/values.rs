use std::sync::Arc;

use crate::common::{DbError, Result};
use crate::tuple::{Schema, Tuple};

/// Leaf operator over an in-memory list of tuples.
pub struct Values {
    schema: Arc<Schema>,
    tuples: Vec<Tuple>,
    position: usize,
}

impl Values {
    pub fn new(schema: Arc<Schema>, tuples: Vec<Tuple>) -> Result<Self> {
        if let Some(bad) = tuples.iter().find(|t| **t.schema() != *schema) {
            return Err(DbError::SchemaMismatch {
                expected: schema.to_string(),
                found: bad.schema().to_string(),
            });
        }
        Ok(Self {
            schema,
            tuples,
            position: 0,
        })
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    pub(crate) fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let tuple = self.tuples.get(self.position).cloned();
        if tuple.is_some() {
            self.position += 1;
        }
        Ok(tuple)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    pub(crate) fn close(&mut self) {}

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
