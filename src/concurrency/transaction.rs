use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::BufferPool;
use crate::common::{Result, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// Handle on a running transaction.
///
/// Committing flushes the pages the transaction dirtied and releases its locks;
/// aborting discards those pages instead. A handle dropped while still active
/// is aborted.
pub struct Transaction {
    id: TransactionId,
    pool: Arc<BufferPool>,
    state: TxnState,
}

impl Transaction {
    /// Starts a new transaction with a fresh id.
    pub fn start(pool: Arc<BufferPool>) -> Self {
        let id = TransactionId::next();
        debug!(tid = %id, "transaction started");
        Self {
            id,
            pool,
            state: TxnState::Active,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    pub fn commit(mut self) -> Result<()> {
        self.complete(true)
    }

    pub fn abort(mut self) -> Result<()> {
        self.complete(false)
    }

    fn complete(&mut self, commit: bool) -> Result<()> {
        self.state = if commit {
            TxnState::Committed
        } else {
            TxnState::Aborted
        };
        let result = self.pool.transaction_complete(self.id, commit);
        debug!(tid = %self.id, commit, ok = result.is_ok(), "transaction completed");
        result
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            warn!(tid = %self.id, "transaction dropped while active, aborting");
            if let Err(e) = self.complete(false) {
                warn!(tid = %self.id, error = %e, "abort on drop failed");
            }
        }
    }
}
