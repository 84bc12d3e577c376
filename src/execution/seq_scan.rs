use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::{Result, TableId, TransactionId};
use crate::storage::heap::HeapFileIterator;
use crate::tuple::{Schema, Tuple};

/// Reads every tuple of a table in page order under shared locks.
pub struct SeqScan {
    table_id: TableId,
    alias: String,
    /// Table schema with names prefixed by the alias
    schema: Arc<Schema>,
    cursor: HeapFileIterator,
}

impl SeqScan {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> Result<Self> {
        let file = pool.catalog().file(table_id)?;
        let schema = Arc::new(file.schema().with_prefix(alias));
        Ok(Self {
            table_id,
            alias: alias.to_string(),
            schema,
            cursor: file.iter(pool, tid),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.cursor.open()
    }

    pub(crate) fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        if !self.cursor.has_next()? {
            return Ok(None);
        }
        let tuple = self.cursor.next()?;
        tuple.with_schema(Arc::clone(&self.schema)).map(Some)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.cursor.rewind()
    }

    pub(crate) fn close(&mut self) {
        self.cursor.close();
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
