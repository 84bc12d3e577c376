use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::catalog::Catalog;
use crate::common::{DbError, PageId, Result, TableId, TransactionId};
use crate::concurrency::LockManager;
use crate::storage::page::HeapPage;
use crate::tuple::Tuple;

use super::{LruKReplacer, PageGuard};

/// Access a caller requests when fetching a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Shared page lock
    ReadOnly,
    /// Exclusive page lock
    ReadWrite,
}

/// A resident page and the number of guards currently pinning it
struct CacheEntry {
    page: Arc<RwLock<HeapPage>>,
    pin_count: u32,
}

/// Internal state shared with the guards' release callbacks
struct PoolState {
    /// Resident pages
    cache: Mutex<HashMap<PageId, CacheEntry>>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
}

/// BufferPool caches heap pages in memory and is the only way transactions
/// reach them.
///
/// Every [`get_page`](Self::get_page) first takes the matching page lock from
/// the [`LockManager`], then pins the page. Pages modified by a transaction
/// stay resident until it completes: eviction never writes a page back (no
/// steal), commit forces the transaction's pages to disk and abort discards them.
pub struct BufferPool {
    /// Maximum number of resident pages
    capacity: usize,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Arc<PoolState>,
    /// Ids of transactions that have committed or aborted
    retired: Mutex<HashSet<TransactionId>>,
}

impl BufferPool {
    /// Creates a buffer pool holding at most `capacity` pages, using LRU-K with the given k.
    pub fn new(capacity: usize, k: usize, catalog: Arc<Catalog>) -> Self {
        Self {
            capacity,
            catalog,
            lock_manager: LockManager::new(),
            state: Arc::new(PoolState {
                cache: Mutex::new(HashMap::new()),
                replacer: LruKReplacer::new(k),
            }),
            retired: Mutex::new(HashSet::new()),
        }
    }

    /// Fails with `TransactionAborted` once `tid` has committed or aborted.
    fn ensure_active(&self, tid: TransactionId) -> Result<()> {
        if self.is_retired(tid) {
            warn!(%tid, "page access by a finished transaction");
            return Err(DbError::TransactionAborted(tid));
        }
        Ok(())
    }

    pub fn is_retired(&self, tid: TransactionId) -> bool {
        self.retired.lock().contains(&tid)
    }

    /// Locks, pins and returns a page, reading it from its heap file on a miss.
    ///
    /// Blocks while a conflicting lock is held and fails with
    /// `DeadlockDetected` if waiting would close a cycle. A miss on a full pool
    /// evicts the least recently used clean, unpinned page, or fails with
    /// `BufferPoolFull` when there is none. A transaction that has already
    /// committed or aborted gets `TransactionAborted`.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permission,
    ) -> Result<PageGuard> {
        self.ensure_active(tid)?;
        match perm {
            Permission::ReadOnly => self.lock_manager.acquire_read(tid, page_id)?,
            Permission::ReadWrite => self.lock_manager.acquire_write(tid, page_id)?,
        }
        // completed while this request was waiting
        if let Err(e) = self.ensure_active(tid) {
            self.lock_manager.release(tid, page_id);
            return Err(e);
        }

        let page = {
            let mut cache = self.state.cache.lock();
            if let Some(entry) = cache.get_mut(&page_id) {
                entry.pin_count += 1;
                self.state.replacer.set_evictable(page_id, false);
                Arc::clone(&entry.page)
            } else {
                while cache.len() >= self.capacity {
                    self.evict_page(&mut cache)?;
                }
                let file = self.catalog.file(page_id.table_id)?;
                let page = Arc::new(RwLock::new(file.read_page(page_id)?));
                cache.insert(
                    page_id,
                    CacheEntry {
                        page: Arc::clone(&page),
                        pin_count: 1,
                    },
                );
                self.state.replacer.record_access(page_id);
                self.state.replacer.set_evictable(page_id, false);
                debug!(%page_id, "loaded page into buffer pool");
                page
            }
        };
        trace!(%tid, %page_id, "pinned page");

        let state = Arc::clone(&self.state);
        Ok(PageGuard::new(
            page_id,
            page,
            Box::new(move |pid, page| {
                let mut cache = state.cache.lock();
                // a discarded page may have been reloaded; only unpin the copy we pinned
                if let Some(entry) = cache.get_mut(&pid) {
                    if Arc::ptr_eq(&entry.page, page) && entry.pin_count > 0 {
                        entry.pin_count -= 1;
                        if entry.pin_count == 0 {
                            state.replacer.record_access(pid);
                            state.replacer.set_evictable(pid, true);
                        }
                    }
                }
                trace!(page_id = %pid, "unpinned page");
            }),
        ))
    }

    /// Removes one clean, unpinned page from the cache. Dirty pages are never
    /// chosen, so nothing is written.
    fn evict_page(&self, cache: &mut HashMap<PageId, CacheEntry>) -> Result<()> {
        let victim = self.state.replacer.evict_if(|pid| match cache.get(pid) {
            Some(entry) => {
                entry.pin_count == 0
                    && entry
                        .page
                        .try_read()
                        .map_or(false, |page| !page.is_dirty())
            }
            None => true,
        });

        match victim {
            Some(page_id) => {
                cache.remove(&page_id);
                debug!(%page_id, "evicted page");
                Ok(())
            }
            None => Err(DbError::BufferPoolFull),
        }
    }

    /// Adds a tuple to a table on behalf of `tid`.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<()> {
        self.ensure_active(tid)?;
        let file = self.catalog.file(table_id)?;
        for guard in file.insert_tuple(self, tid, tuple)? {
            guard.write().mark_dirty(tid);
        }
        Ok(())
    }

    /// Removes a tuple, located by its record id, on behalf of `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        self.ensure_active(tid)?;
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.file(rid.page_id.table_id)?;
        for guard in file.delete_tuple(self, tid, tuple)? {
            guard.write().mark_dirty(tid);
        }
        Ok(())
    }

    fn resident_page(&self, page_id: PageId) -> Option<Arc<RwLock<HeapPage>>> {
        self.state
            .cache
            .lock()
            .get(&page_id)
            .map(|e| Arc::clone(&e.page))
    }

    /// Writes a resident page to disk if it is dirty. The page stays cached.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        match self.resident_page(page_id) {
            Some(page) => self.write_back(&page),
            None => Ok(()),
        }
    }

    fn write_back(&self, page: &RwLock<HeapPage>) -> Result<()> {
        let mut page = page.write();
        if page.is_dirty() {
            let file = self.catalog.file(page.page_id().table_id)?;
            file.write_page(&page)?;
            page.mark_clean();
        }
        Ok(())
    }

    /// Writes every dirty resident page to disk.
    ///
    /// This bypasses transaction boundaries and can persist uncommitted data.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<_> = self
            .state
            .cache
            .lock()
            .values()
            .map(|e| Arc::clone(&e.page))
            .collect();
        for page in pages {
            self.write_back(&page)?;
        }
        Ok(())
    }

    /// Resident pages last dirtied by `tid`. Under strict 2PL such a page is
    /// exclusively locked by `tid`, so only its locked pages are examined.
    fn pages_dirtied_by(&self, tid: TransactionId) -> Vec<(PageId, Arc<RwLock<HeapPage>>)> {
        self.lock_manager
            .pages_locked_by(tid)
            .into_iter()
            .filter_map(|pid| self.resident_page(pid).map(|p| (pid, p)))
            .filter(|(_, page)| page.read().dirtied_by() == Some(tid))
            .collect()
    }

    /// Writes every page dirtied by `tid` to disk and syncs the files they
    /// belong to.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let mut tables = HashSet::new();
        for (page_id, page) in self.pages_dirtied_by(tid) {
            self.write_back(&page)?;
            tables.insert(page_id.table_id);
        }
        for table_id in tables {
            self.catalog.file(table_id)?.sync()?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        if self.state.cache.lock().remove(&page_id).is_some() {
            self.state.replacer.remove(page_id);
            debug!(%page_id, "discarded page");
        }
    }

    /// Finishes a transaction. Commit flushes the pages it dirtied; abort
    /// discards them so the next reader sees the on-disk image. Either way all
    /// of its locks are released, even if flushing fails. Afterwards `tid` is
    /// retired and any further page access with it fails.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        self.retired.lock().insert(tid);
        let result = if commit {
            self.flush_pages(tid)
        } else {
            for (page_id, _) in self.pages_dirtied_by(tid) {
                self.discard_page(page_id);
            }
            Ok(())
        };
        self.lock_manager.release_all(tid);
        result
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(tid, page_id)
    }

    /// Releases one page lock before the transaction ends.
    ///
    /// This breaks two-phase locking and should only be used for pages the
    /// transaction did not modify.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.lock_manager.release(tid, page_id);
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.state.cache.lock().get(&page_id).map(|e| e.pin_count)
    }

    /// Returns the number of resident pages.
    pub fn cached_pages(&self) -> usize {
        self.state.cache.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}
