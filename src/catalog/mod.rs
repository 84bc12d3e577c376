//! System catalog: the registry of tables known to a database.
//!
//! Each table is a [`HeapFile`] registered under a unique [`TableId`] and a
//! name. Registering a table whose name or id is already taken replaces the
//! previous entry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{DbError, Result, TableId};
use crate::storage::heap::HeapFile;
use crate::tuple::Schema;

struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: Option<String>,
}

#[derive(Default)]
struct CatalogState {
    tables: HashMap<TableId, TableEntry>,
    name_to_id: HashMap<String, TableId>,
    next_id: u32,
}

/// Maps table ids and names to heap files and their schemas.
#[derive(Default)]
pub struct Catalog {
    state: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or creates) a heap file at `path` and registers it under a new id.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        schema: Arc<Schema>,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        let table_id = {
            let mut state = self.state.write();
            let id = TableId::new(state.next_id);
            state.next_id += 1;
            id
        };
        let file = Arc::new(HeapFile::open(path, table_id, schema)?);
        self.add_table(file, name, primary_key);
        Ok(table_id)
    }

    /// Registers an already opened heap file under its own id.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str, primary_key: Option<&str>) {
        let table_id = file.id();
        let mut state = self.state.write();

        if let Some(old_id) = state.name_to_id.remove(name) {
            state.tables.remove(&old_id);
        }
        if let Some(old) = state.tables.remove(&table_id) {
            state.name_to_id.remove(&old.name);
        }
        state.next_id = state.next_id.max(table_id.as_u32() + 1);
        state.name_to_id.insert(name.to_string(), table_id);
        state.tables.insert(
            table_id,
            TableEntry {
                file,
                name: name.to_string(),
                primary_key: primary_key.map(str::to_string),
            },
        );
        debug!(table = name, id = table_id.as_u32(), "registered table");
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.state
            .read()
            .name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn with_entry<T>(&self, table_id: TableId, f: impl FnOnce(&TableEntry) -> T) -> Result<T> {
        self.state
            .read()
            .tables
            .get(&table_id)
            .map(f)
            .ok_or_else(|| DbError::TableNotFound(table_id.to_string()))
    }

    pub fn file(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.with_entry(table_id, |e| Arc::clone(&e.file))
    }

    pub fn schema(&self, table_id: TableId) -> Result<Arc<Schema>> {
        self.with_entry(table_id, |e| Arc::clone(e.file.schema()))
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.with_entry(table_id, |e| e.name.clone())
    }

    pub fn primary_key(&self, table_id: TableId) -> Result<Option<String>> {
        self.with_entry(table_id, |e| e.primary_key.clone())
    }

    /// Returns every registered table id in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.state.read().tables.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Forgets every table. Files on disk are left untouched.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.tables.clear();
        state.name_to_id.clear();
    }
}
