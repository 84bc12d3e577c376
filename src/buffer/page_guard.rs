use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::HeapPage;

/// Callback type for releasing a page guard
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, &Arc<RwLock<HeapPage>>) + Send + Sync>;

/// RAII handle on a pinned buffer pool page.
///
/// The page stays pinned, and therefore resident, for as long as the guard
/// lives. Dropping the guard unpins it. The page lock taken in
/// [`BufferPool::get_page`](super::BufferPool::get_page) is a transaction lock
/// and outlives the guard; [`read`](Self::read) and [`write`](Self::write)
/// only latch the in-memory copy for the duration of the borrow.
pub struct PageGuard {
    page_id: PageId,
    page: Arc<RwLock<HeapPage>>,
    release_callback: Option<ReleaseCallback>,
}

impl PageGuard {
    pub(crate) fn new(
        page_id: PageId,
        page: Arc<RwLock<HeapPage>>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            page_id,
            page,
            release_callback: Some(release_callback),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Latches the page for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    /// Latches the page for modification.
    pub fn write(&self) -> RwLockWriteGuard<'_, HeapPage> {
        self.page.write()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, &self.page);
        }
    }
}

impl fmt::Debug for PageGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;
    use crate::tuple::{DataType, Schema};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_release_on_drop() {
        let pid = PageId::new(TableId::new(1), 0);
        let schema = Schema::builder().column("v", DataType::Int).build_arc();
        let page = Arc::new(RwLock::new(HeapPage::empty(pid, schema)));

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        let expected = Arc::clone(&page);

        let guard = PageGuard::new(
            pid,
            page,
            Box::new(move |released_pid, released_page| {
                assert_eq!(released_pid, pid);
                assert!(Arc::ptr_eq(released_page, &expected));
                released_clone.store(true, Ordering::SeqCst);
            }),
        );

        assert_eq!(guard.page_id(), pid);
        assert_eq!(guard.read().num_empty_slots(), guard.read().capacity());
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }
}
