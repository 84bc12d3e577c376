//! Page-level lock management for strict two-phase locking.
//!
//! Every page has a shared/exclusive lock with a FIFO queue of blocked
//! requests. A request that has to wait first registers its blockers (the
//! other holders plus every request queued ahead of it) in a wait-for graph.
//! If the graph then contains a path from the requester back to itself, the
//! request is withdrawn and fails with [`DbError::DeadlockDetected`].
//!
//! # Lock Compatibility
//!
//! ```text
//!          │ S  │ X  │
//! ─────────┼────┼────┤
//!     S    │ ✓  │ ✗  │
//!     X    │ ✗  │ ✗  │
//! ```
//!
//! A transaction that is the only reader of a page may upgrade to exclusive
//! without queueing.
//!
//! # Lock Ordering
//!
//! The lock table mutex is always taken before the wait-for graph mutex.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::common::{DbError, PageId, Result, TransactionId};

use super::WaitForGraph;

/// Lock mode for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock (read lock).
    Shared,
    /// Exclusive lock (write lock).
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "S"),
            LockMode::Exclusive => write!(f, "X"),
        }
    }
}

/// A blocked lock request.
#[derive(Debug, Clone, Copy)]
struct LockRequest {
    tid: TransactionId,
    mode: LockMode,
}

/// State of the lock on one page.
#[derive(Debug, Default)]
struct PageLock {
    /// Transactions holding the lock
    holders: HashSet<TransactionId>,
    /// Whether the single holder holds it exclusively
    exclusive: bool,
    /// Blocked requests in arrival order
    wait_queue: VecDeque<LockRequest>,
}

impl PageLock {
    fn readers(&self) -> usize {
        if self.exclusive {
            0
        } else {
            self.holders.len()
        }
    }

    fn is_free(&self) -> bool {
        self.holders.is_empty() && self.wait_queue.is_empty()
    }

    fn mode_of(&self, tid: TransactionId) -> Option<LockMode> {
        if !self.holders.contains(&tid) {
            None
        } else if self.exclusive {
            Some(LockMode::Exclusive)
        } else {
            Some(LockMode::Shared)
        }
    }

    /// True if `tid` is the sole reader and may upgrade in place.
    fn can_upgrade(&self, tid: TransactionId) -> bool {
        !self.exclusive && self.holders.len() == 1 && self.holders.contains(&tid)
    }

    /// Compatibility with the current holders, ignoring the queue.
    fn compatible(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => !self.exclusive,
            LockMode::Exclusive => self.holders.is_empty(),
        }
    }

    /// Requests queued before `tid`'s own request, or the whole queue if
    /// `tid` is not queued.
    fn queued_ahead(&self, tid: TransactionId) -> impl Iterator<Item = &LockRequest> {
        self.wait_queue.iter().take_while(move |r| r.tid != tid)
    }

    fn dequeue(&mut self, tid: TransactionId) {
        self.wait_queue.retain(|r| r.tid != tid);
    }

    /// Transactions `waiter` is currently blocked by.
    fn blockers_of(&self, waiter: LockRequest) -> HashSet<TransactionId> {
        let mut blockers: HashSet<TransactionId> = self
            .holders
            .iter()
            .copied()
            .filter(|&t| t != waiter.tid)
            .collect();
        // an upgrading holder bypasses the queue
        if !self.holders.contains(&waiter.tid) {
            blockers.extend(self.queued_ahead(waiter.tid).map(|r| r.tid));
        }
        blockers
    }
}

/// The lock table: per-page locks plus the pages each transaction holds.
#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PageId, PageLock>,
    held: HashMap<TransactionId, HashSet<PageId>>,
}

/// Statistics about the lock manager.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total lock acquisitions.
    pub acquisitions: AtomicU64,
    /// Total lock releases.
    pub releases: AtomicU64,
    /// Total requests that had to wait.
    pub waits: AtomicU64,
    /// Total deadlocks detected.
    pub deadlocks: AtomicU64,
    /// Total in-place upgrades.
    pub upgrades: AtomicU64,
}

impl LockStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(AtomicOrdering::Relaxed)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(AtomicOrdering::Relaxed)
    }

    pub fn waits(&self) -> u64 {
        self.waits.load(AtomicOrdering::Relaxed)
    }

    pub fn deadlocks(&self) -> u64 {
        self.deadlocks.load(AtomicOrdering::Relaxed)
    }

    pub fn upgrades(&self) -> u64 {
        self.upgrades.load(AtomicOrdering::Relaxed)
    }
}

/// Grants page locks to transactions and blocks conflicting requests.
pub struct LockManager {
    table: Mutex<LockTable>,
    /// Signalled whenever a lock is released or a queue changes
    changed: Condvar,
    /// Wait-for edges, kept in step with the queues in `table`
    graph: Mutex<WaitForGraph>,
    stats: LockStats,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            changed: Condvar::new(),
            graph: Mutex::new(WaitForGraph::new()),
            stats: LockStats::new(),
        }
    }

    /// Acquires a shared lock, blocking until granted or a deadlock is detected.
    pub fn acquire_read(&self, tid: TransactionId, page_id: PageId) -> Result<()> {
        self.acquire(tid, page_id, LockMode::Shared)
    }

    /// Acquires an exclusive lock, blocking until granted or a deadlock is detected.
    pub fn acquire_write(&self, tid: TransactionId, page_id: PageId) -> Result<()> {
        self.acquire(tid, page_id, LockMode::Exclusive)
    }

    pub fn acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let mut table = self.table.lock();
        let mut queued = false;

        loop {
            let LockTable { locks, held } = &mut *table;
            let lock = locks.entry(page_id).or_default();

            let already_held = matches!(
                (lock.mode_of(tid), mode),
                (Some(LockMode::Exclusive), _) | (Some(LockMode::Shared), LockMode::Shared)
            );

            let granted = if already_held {
                true
            } else if mode == LockMode::Exclusive && lock.can_upgrade(tid) {
                lock.exclusive = true;
                LockStats::record(&self.stats.upgrades);
                debug!(%tid, %page_id, "lock upgraded");
                true
            } else if lock.compatible(mode) && lock.queued_ahead(tid).next().is_none() {
                lock.holders.insert(tid);
                lock.exclusive = mode == LockMode::Exclusive;
                held.entry(tid).or_default().insert(page_id);
                LockStats::record(&self.stats.acquisitions);
                true
            } else {
                false
            };

            if granted {
                if queued {
                    lock.dequeue(tid);
                    let mut graph = self.graph.lock();
                    graph.remove(tid);
                    Self::refresh_edges(&mut graph, lock);
                    debug!(%tid, %page_id, %mode, "lock granted after wait");
                    // the queue head moved, so later waiters may now proceed
                    self.changed.notify_all();
                }
                return Ok(());
            }

            if !queued {
                lock.wait_queue.push_back(LockRequest { tid, mode });
                queued = true;
                LockStats::record(&self.stats.waits);
                debug!(%tid, %page_id, %mode, "lock request waiting");
            }

            {
                let mut graph = self.graph.lock();
                Self::refresh_edges(&mut graph, lock);
                if graph.has_cycle_from(tid) {
                    graph.remove(tid);
                    lock.dequeue(tid);
                    Self::refresh_edges(&mut graph, lock);
                    drop(graph);

                    if lock.is_free() {
                        locks.remove(&page_id);
                    }
                    LockStats::record(&self.stats.deadlocks);
                    warn!(%tid, %page_id, %mode, "deadlock detected, aborting request");
                    self.changed.notify_all();
                    return Err(DbError::DeadlockDetected(tid));
                }
            }

            self.changed.wait(&mut table);
        }
    }

    /// Recomputes the wait-for edges of every request queued on `lock`.
    fn refresh_edges(graph: &mut WaitForGraph, lock: &PageLock) {
        for request in &lock.wait_queue {
            graph.set_waits(request.tid, lock.blockers_of(*request));
        }
    }

    /// Releases `tid`'s lock on one page. Returns false if it held none.
    pub fn release(&self, tid: TransactionId, page_id: PageId) -> bool {
        let mut table = self.table.lock();
        let released = Self::release_locked(&mut table, &self.graph, tid, page_id);
        if released {
            LockStats::record(&self.stats.releases);
            self.changed.notify_all();
        }
        released
    }

    fn release_locked(
        table: &mut LockTable,
        graph: &Mutex<WaitForGraph>,
        tid: TransactionId,
        page_id: PageId,
    ) -> bool {
        let Some(lock) = table.locks.get_mut(&page_id) else {
            return false;
        };
        if !lock.holders.remove(&tid) {
            return false;
        }
        if lock.holders.is_empty() {
            lock.exclusive = false;
        }
        if lock.is_free() {
            table.locks.remove(&page_id);
        } else {
            Self::refresh_edges(&mut graph.lock(), lock);
        }

        if let Some(pages) = table.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                table.held.remove(&tid);
            }
        }
        true
    }

    /// Releases every lock `tid` holds and returns how many there were.
    pub fn release_all(&self, tid: TransactionId) -> usize {
        let mut table = self.table.lock();
        let pages: Vec<PageId> = table
            .held
            .get(&tid)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();

        let mut count = 0;
        for page_id in pages {
            if Self::release_locked(&mut table, &self.graph, tid, page_id) {
                LockStats::record(&self.stats.releases);
                count += 1;
            }
        }
        table.held.remove(&tid);
        self.graph.lock().remove(tid);
        self.changed.notify_all();

        debug!(%tid, count, "released all locks");
        count
    }

    /// Returns true if `tid` holds any lock on the page.
    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    /// Returns the mode in which `tid` holds the page, if at all.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table
            .lock()
            .locks
            .get(&page_id)
            .and_then(|l| l.mode_of(tid))
    }

    /// Returns the number of readers and writers currently holding the page.
    pub fn holder_counts(&self, page_id: PageId) -> (usize, usize) {
        let table = self.table.lock();
        match table.locks.get(&page_id) {
            Some(lock) => (lock.readers(), lock.holders.len() - lock.readers()),
            None => (0, 0),
        }
    }

    /// Returns every page `tid` holds a lock on.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .table
            .lock()
            .held
            .get(&tid)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();
        pages.sort_unstable();
        pages
    }

    pub fn stats(&self) -> &LockStats {
        &self.stats
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("LockManager")
            .field("locked_pages", &table.locks.len())
            .field("transactions", &table.held.len())
            .field("deadlocks", &self.stats.deadlocks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn pid(n: u32) -> PageId {
        PageId::new(TableId::new(1), n)
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::next(), TransactionId::next());
        lm.acquire_read(t1, pid(0)).unwrap();
        lm.acquire_read(t2, pid(0)).unwrap();
        assert_eq!(lm.holder_counts(pid(0)), (2, 0));
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(LockMode::Shared));
    }

    #[test]
    fn test_reacquire_is_noop() {
        let lm = LockManager::new();
        let t1 = TransactionId::next();
        lm.acquire_write(t1, pid(0)).unwrap();
        lm.acquire_read(t1, pid(0)).unwrap();
        lm.acquire_write(t1, pid(0)).unwrap();
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(LockMode::Exclusive));
        assert_eq!(lm.release_all(t1), 1);
    }

    #[test]
    fn test_sole_reader_upgrades() {
        let lm = LockManager::new();
        let t1 = TransactionId::next();
        lm.acquire_read(t1, pid(0)).unwrap();
        lm.acquire_write(t1, pid(0)).unwrap();
        assert_eq!(lm.holder_counts(pid(0)), (0, 1));
        assert_eq!(lm.stats().upgrades(), 1);
    }

    #[test]
    fn test_release_removes_lock() {
        let lm = LockManager::new();
        let t1 = TransactionId::next();
        lm.acquire_read(t1, pid(3)).unwrap();
        assert!(lm.holds_lock(t1, pid(3)));
        assert!(lm.release(t1, pid(3)));
        assert!(!lm.holds_lock(t1, pid(3)));
        assert!(!lm.release(t1, pid(3)));
        assert!(lm.pages_locked_by(t1).is_empty());
    }

    #[test]
    fn test_writer_waits_for_reader() {
        let lm = Arc::new(LockManager::new());
        let (t1, t2) = (TransactionId::next(), TransactionId::next());
        lm.acquire_read(t1, pid(0)).unwrap();

        let (tx, rx) = mpsc::channel();
        let lm2 = Arc::clone(&lm);
        let handle = thread::spawn(move || {
            lm2.acquire_write(t2, pid(0)).unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        lm.release_all(t1);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(lm.lock_mode(t2, pid(0)), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_two_way_deadlock() {
        let lm = Arc::new(LockManager::new());
        let (t1, t2) = (TransactionId::next(), TransactionId::next());
        lm.acquire_write(t1, pid(0)).unwrap();
        lm.acquire_write(t2, pid(1)).unwrap();

        // t1 blocks on page 1 in the background
        let lm2 = Arc::clone(&lm);
        let handle = thread::spawn(move || lm2.acquire_write(t1, pid(1)));
        while lm.stats().waits() == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        // t2 closing the cycle is refused
        let result = lm.acquire_write(t2, pid(0));
        assert!(matches!(result, Err(DbError::DeadlockDetected(t)) if t == t2));
        assert_eq!(lm.stats().deadlocks(), 1);

        lm.release_all(t2);
        handle.join().unwrap().unwrap();
        assert!(lm.holds_lock(t1, pid(1)));
    }

    #[test]
    fn test_upgrade_deadlock() {
        let lm = Arc::new(LockManager::new());
        let (t1, t2) = (TransactionId::next(), TransactionId::next());
        lm.acquire_read(t1, pid(0)).unwrap();
        lm.acquire_read(t2, pid(0)).unwrap();

        let lm2 = Arc::clone(&lm);
        let handle = thread::spawn(move || lm2.acquire_write(t1, pid(0)));
        while lm.stats().waits() == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(matches!(
            lm.acquire_write(t2, pid(0)),
            Err(DbError::DeadlockDetected(_))
        ));
        lm.release_all(t2);
        handle.join().unwrap().unwrap();
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_fifo_reader_queues_behind_writer() {
        let lm = Arc::new(LockManager::new());
        let (t1, t2, t3) = (
            TransactionId::next(),
            TransactionId::next(),
            TransactionId::next(),
        );
        lm.acquire_read(t1, pid(0)).unwrap();

        let lm2 = Arc::clone(&lm);
        let writer = thread::spawn(move || lm2.acquire_write(t2, pid(0)));
        while lm.stats().waits() < 1 {
            thread::sleep(Duration::from_millis(5));
        }

        let lm3 = Arc::clone(&lm);
        let reader = thread::spawn(move || lm3.acquire_read(t3, pid(0)));
        while lm.stats().waits() < 2 {
            thread::sleep(Duration::from_millis(5));
        }
        // t3 is compatible with t1 but must not jump the queued writer
        assert!(!lm.holds_lock(t3, pid(0)));

        lm.release_all(t1);
        writer.join().unwrap().unwrap();
        assert!(!lm.holds_lock(t3, pid(0)));

        lm.release_all(t2);
        reader.join().unwrap().unwrap();
        assert!(lm.holds_lock(t3, pid(0)));
    }
}
