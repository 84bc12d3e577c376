use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Timestamp};

/// Tracks access history for a single cached page
#[derive(Debug)]
struct AccessInfo {
    /// History of access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
    /// Whether this page is currently evictable
    is_evictable: bool,
}

impl AccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance, or None (+inf) with fewer than k accesses.
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Timestamp {
        self.history.front().copied().unwrap_or(0)
    }

    /// Sort key: pages with +inf distance come first, oldest first; then
    /// pages with the largest finite distance.
    fn eviction_key(&self, current_timestamp: Timestamp, k: usize) -> (u8, Timestamp) {
        match self.k_distance(current_timestamp, k) {
            None => (0, self.earliest_timestamp()),
            Some(dist) => (1, Timestamp::MAX - dist),
        }
    }
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts the page whose backward k-distance is the maximum
/// of all evictable pages. Backward k-distance is the difference in time between
/// the current timestamp and the timestamp of the kth previous access.
///
/// A page with fewer than k recorded accesses has +inf backward k-distance. If
/// several pages have +inf distance, the one with the earliest access goes first.
/// With k = 1 this is plain LRU.
pub struct LruKReplacer {
    k: usize,
    /// Logical clock (monotonically increasing)
    current_timestamp: AtomicU64,
    pages: Mutex<HashMap<PageId, AccessInfo>>,
}

impl LruKReplacer {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            current_timestamp: AtomicU64::new(0),
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Evicts the evictable page with the largest backward k-distance.
    pub fn evict(&self) -> Option<PageId> {
        self.evict_if(|_| true)
    }

    /// Evicts the best candidate for which `accept` returns true, trying
    /// candidates in eviction order. Rejected pages stay in the replacer.
    pub fn evict_if<F>(&self, mut accept: F) -> Option<PageId>
    where
        F: FnMut(&PageId) -> bool,
    {
        let mut pages = self.pages.lock();
        let current_ts = self.current_timestamp.load(Ordering::Relaxed);

        let mut candidates: Vec<(PageId, (u8, Timestamp))> = pages
            .iter()
            .filter(|(_, info)| info.is_evictable)
            .map(|(pid, info)| (*pid, info.eviction_key(current_ts, self.k)))
            .collect();
        candidates.sort_by_key(|&(pid, key)| (key, pid));

        let victim = candidates
            .into_iter()
            .map(|(pid, _)| pid)
            .find(|pid| accept(pid))?;
        pages.remove(&victim);
        Some(victim)
    }

    /// Records an access to `page_id` at the current timestamp.
    pub fn record_access(&self, page_id: PageId) {
        let timestamp = self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        self.pages
            .lock()
            .entry(page_id)
            .or_insert_with(AccessInfo::new)
            .record_access(timestamp, self.k);
    }

    /// Sets whether a page may be chosen for eviction.
    pub fn set_evictable(&self, page_id: PageId, is_evictable: bool) {
        let mut pages = self.pages.lock();
        if let Some(info) = pages.get_mut(&page_id) {
            info.is_evictable = is_evictable;
        } else if is_evictable {
            let mut info = AccessInfo::new();
            info.is_evictable = true;
            pages.insert(page_id, info);
        }
    }

    /// Forgets a page entirely.
    pub fn remove(&self, page_id: PageId) {
        self.pages.lock().remove(&page_id);
    }

    /// Returns the number of evictable pages.
    pub fn size(&self) -> usize {
        self.pages.lock().values().filter(|i| i.is_evictable).count()
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;

    fn pid(n: u32) -> PageId {
        PageId::new(TableId::new(1), n)
    }

    #[test]
    fn test_evict_empty() {
        let replacer = LruKReplacer::new(2);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_order_with_k1() {
        let replacer = LruKReplacer::new(1);
        for n in 0..3 {
            replacer.record_access(pid(n));
            replacer.set_evictable(pid(n), true);
        }
        // touching page 0 makes page 1 the least recently used
        replacer.record_access(pid(0));

        assert_eq!(replacer.evict(), Some(pid(1)));
        assert_eq!(replacer.evict(), Some(pid(2)));
        assert_eq!(replacer.evict(), Some(pid(0)));
    }

    #[test]
    fn test_infinite_distance_first() {
        let replacer = LruKReplacer::new(2);
        replacer.record_access(pid(0));
        replacer.record_access(pid(0));
        replacer.record_access(pid(1));
        replacer.set_evictable(pid(0), true);
        replacer.set_evictable(pid(1), true);

        // page 1 has a single access, so its distance is +inf
        assert_eq!(replacer.evict(), Some(pid(1)));
    }

    #[test]
    fn test_not_evictable() {
        let replacer = LruKReplacer::new(1);
        replacer.record_access(pid(0));
        replacer.record_access(pid(1));
        replacer.set_evictable(pid(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(pid(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_evict_if_skips_rejected() {
        let replacer = LruKReplacer::new(1);
        for n in 0..3 {
            replacer.record_access(pid(n));
            replacer.set_evictable(pid(n), true);
        }

        assert_eq!(replacer.evict_if(|p| p.page_number != 0), Some(pid(1)));
        // the rejected page is still a candidate
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict_if(|_| false), None);
        assert_eq!(replacer.evict(), Some(pid(0)));
    }

    #[test]
    fn test_remove_and_toggle() {
        let replacer = LruKReplacer::new(1);
        replacer.record_access(pid(0));
        replacer.set_evictable(pid(0), true);
        replacer.set_evictable(pid(0), false);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(pid(0), true);
        replacer.remove(pid(0));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }
}
