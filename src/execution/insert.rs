use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::common::{DbError, Result, TableId, TransactionId};
use crate::tuple::{DataType, Field, Schema, Tuple};

use super::Operator;

/// Schema of the single tuple produced by [`Insert`] and [`Delete`].
pub(crate) fn count_schema() -> Arc<Schema> {
    Schema::builder().column("count", DataType::Int).build_arc()
}

fn check_child_schema(pool: &BufferPool, table_id: TableId, child: &Operator) -> Result<()> {
    let table_schema = pool.catalog().schema(table_id)?;
    if **child.schema() != *table_schema {
        return Err(DbError::SchemaMismatch {
            expected: table_schema.to_string(),
            found: child.schema().to_string(),
        });
    }
    Ok(())
}

/// Inserts every child tuple into a table and yields one `(count)` tuple.
///
/// The insert runs on the first fetch after `open`. It runs only once per
/// operator: rewinding or reopening afterwards yields nothing.
pub struct Insert {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<Operator>,
    table_id: TableId,
    schema: Arc<Schema>,
    done: bool,
}

impl Insert {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        child: Operator,
        table_id: TableId,
    ) -> Result<Self> {
        check_child_schema(&pool, table_id, &child)?;
        Ok(Self {
            pool,
            tid,
            child: Box::new(child),
            table_id,
            schema: count_schema(),
            done: false,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub(crate) fn child(&self) -> &Operator {
        &self.child
    }

    /// Replaces the source. A child whose column types differ from the
    /// table's is rejected and the current one kept.
    pub(crate) fn set_child(&mut self, child: Operator) -> Result<()> {
        check_child_schema(&self.pool, self.table_id, &child)?;
        self.child = Box::new(child);
        Ok(())
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    pub(crate) fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let table_schema = self.pool.catalog().schema(self.table_id)?;
        let mut count = 0i32;
        while self.child.has_next()? {
            let mut tuple = self.child.next()?.with_schema(Arc::clone(&table_schema))?;
            self.pool.insert_tuple(self.tid, self.table_id, &mut tuple)?;
            count += 1;
        }
        debug!(tid = %self.tid, table = %self.table_id, count, "inserted tuples");
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
