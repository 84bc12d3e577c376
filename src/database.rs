use std::sync::Arc;

use tracing::info;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::{DatabaseConfig, Result, TableId};
use crate::concurrency::Transaction;
use crate::tuple::Schema;

/// Owns the catalog and the buffer pool that every transaction shares.
pub struct Database {
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let pool = Arc::new(BufferPool::new(
            config.buffer_pool_pages,
            config.replacer_k,
            Arc::clone(&catalog),
        ));
        info!(
            pool_pages = config.buffer_pool_pages,
            k = config.replacer_k,
            data_dir = %config.data_dir.display(),
            "database opened"
        );
        Self {
            config,
            catalog,
            pool,
        }
    }

    /// Opens a database configured from the environment.
    pub fn open_default() -> Self {
        Self::new(DatabaseConfig::from_env())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Creates (or reopens) `<data_dir>/<name>.dat` and registers it.
    pub fn create_table(
        &self,
        name: &str,
        schema: Arc<Schema>,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        let path = self.config.data_dir.join(format!("{}.dat", name));
        let table_id = self.catalog.create_table(name, &path, schema, primary_key)?;
        info!(table = name, id = %table_id, path = %path.display(), "table registered");
        Ok(table_id)
    }

    pub fn begin(&self) -> Transaction {
        Transaction::start(Arc::clone(&self.pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::DataType;
    use tempfile::TempDir;

    #[test]
    fn test_create_table_in_data_dir() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(DatabaseConfig::default().with_data_dir(dir.path()));
        let schema = Schema::builder().column("id", DataType::Int).build_arc();

        let id = db.create_table("users", schema, Some("id")).unwrap();
        assert_eq!(db.catalog().table_id("users").unwrap(), id);
        assert_eq!(db.catalog().primary_key(id).unwrap().as_deref(), Some("id"));
        assert!(dir.path().join("users.dat").exists());
    }

    #[test]
    fn test_begin_issues_distinct_ids() {
        let db = Database::new(DatabaseConfig::default().with_buffer_pool_pages(4));
        let t1 = db.begin();
        let t2 = db.begin();
        assert_ne!(t1.id(), t2.id());
        assert_eq!(db.buffer_pool().capacity(), 4);
        t1.commit().unwrap();
        t2.abort().unwrap();
    }
}
