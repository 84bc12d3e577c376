//! heapdb - A small transactional storage and query engine
//!
//! Tables are heap files of fixed-size pages holding fixed-width tuples.
//! Transactions read and write pages through a shared buffer pool under
//! strict two-phase locking, and queries are trees of pull-based operators.
//!
//! # Architecture
//!
//! - **Tuples** (`tuple`): Field values, schemas and their on-disk encoding
//!
//! - **Storage** (`storage`): Page layout and file access
//!   - `HeapPage`: Occupancy bitmap followed by fixed-width tuple slots
//!   - `HeapFile`: A table stored as a sequence of heap pages
//!
//! - **Buffer Pool** (`buffer`): Page cache shared by all transactions
//!   - `BufferPool`: Locks, pins and caches pages; no-steal, flush on commit
//!   - `LruKReplacer`: LRU-K victim selection over unpinned clean pages
//!   - `PageGuard`: RAII pin on a cached page
//!
//! - **Concurrency** (`concurrency`): Page-level shared/exclusive locks with
//!   wait-for-graph deadlock detection, and the `Transaction` handle
//!
//! - **Catalog** (`catalog`): Table ids, names, schemas and files
//!
//! - **Execution** (`execution`): SeqScan, Filter, Join, Aggregate, Insert and
//!   Delete operators
//!
//! # Example
//!
//! ```rust,no_run
//! use heapdb::execution::Operator;
//! use heapdb::tuple::{DataType, Schema, Tuple};
//! use heapdb::{Database, DatabaseConfig};
//!
//! let db = Database::new(DatabaseConfig::default().with_data_dir("/tmp"));
//! let schema = Schema::builder().column("id", DataType::Int).build_arc();
//! let table = db.create_table("numbers", schema.clone(), None).unwrap();
//!
//! let txn = db.begin();
//! let mut tuple = Tuple::new(schema, vec![7.into()]).unwrap();
//! db.buffer_pool().insert_tuple(txn.id(), table, &mut tuple).unwrap();
//!
//! let mut scan = Operator::seq_scan(db.buffer_pool().clone(), txn.id(), table, "n").unwrap();
//! scan.open().unwrap();
//! for tuple in scan.fetch_all().unwrap() {
//!     println!("{}", tuple);
//! }
//! scan.close();
//! txn.commit().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod database;
pub mod execution;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{DatabaseConfig, DbError, PageId, RecordId, Result, TableId, TransactionId};
pub use database::Database;
