use thiserror::Error;

use super::types::{PageId, TransactionId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema mismatch: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Page {0} has no free slots")]
    PageFull(PageId),

    #[error("Slot not occupied: {0}")]
    SlotNotOccupied(String),

    #[error("Corrupt page {0}: {1}")]
    CorruptPage(PageId, String),

    #[error("Invalid page {0}")]
    InvalidPage(PageId),

    #[error("Deadlock detected, {0} must abort")]
    DeadlockDetected(TransactionId),

    #[error("{0} has already committed or aborted")]
    TransactionAborted(TransactionId),

    #[error("Buffer pool is full, no clean unpinned pages to evict")]
    BufferPoolFull,

    #[error("No more tuples")]
    NoSuchElement,

    #[error("No such field: {0}")]
    NoSuchField(String),

    #[error("Field index {0} out of bounds")]
    FieldIndexOutOfBounds(usize),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Aggregate {op} is not supported over {data_type} fields")]
    UnsupportedAggregate { op: String, data_type: String },

    #[error("Integer overflow while aggregating")]
    ArithmeticOverflow,

    #[error("Operator used before open()")]
    OperatorNotOpen,

    #[error("Tuple has no record id")]
    MissingRecordId,
}

impl DbError {
    /// True for errors after which the owning transaction must be aborted.
    pub fn is_transaction_fatal(&self) -> bool {
        matches!(
            self,
            DbError::DeadlockDetected(_) | DbError::TransactionAborted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
