use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{BufferPool, PageGuard, Permission};
use crate::common::{DbError, PageId, Result, TableId, TransactionId, PAGE_SIZE};
use crate::storage::page::HeapPage;
use crate::tuple::{Schema, Tuple};

/// A table stored as an unordered sequence of heap pages in a single file.
///
/// Page `n` lives at bytes `[n * PAGE_SIZE, (n + 1) * PAGE_SIZE)`, so the file
/// length is always a multiple of the page size. Direct page I/O goes through
/// [`read_page`](Self::read_page) and [`write_page`](Self::write_page); tuple-level
/// access goes through the buffer pool so that it is locked and cached.
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    path: PathBuf,
    file: Mutex<File>,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl HeapFile {
    /// Opens the heap file at `path`, creating it if it doesn't exist.
    pub fn open<P: AsRef<Path>>(path: P, table_id: TableId, schema: Arc<Schema>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self {
            table_id,
            schema,
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(file),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of whole pages in the file.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        Ok(Self::pages_in(&file)?)
    }

    fn pages_in(file: &File) -> std::io::Result<u32> {
        Ok((file.metadata()?.len() / PAGE_SIZE as u64) as u32)
    }

    /// Reads and decodes a page. Fails with `InvalidPage` if the page belongs to
    /// another table or lies past the end of the file.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        if page_id.table_id != self.table_id {
            return Err(DbError::InvalidPage(page_id));
        }

        let mut data = vec![0u8; PAGE_SIZE];
        {
            let mut file = self.file.lock();
            if page_id.page_number >= Self::pages_in(&file)? {
                return Err(DbError::InvalidPage(page_id));
            }
            file.seek(SeekFrom::Start(page_id.file_offset()))?;
            file.read_exact(&mut data)?;
        }
        self.num_reads.fetch_add(1, Ordering::Relaxed);

        HeapPage::decode(page_id, Arc::clone(&self.schema), &data)
    }

    /// Writes a page image at its offset.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_id = page.page_id();
        if page_id.table_id != self.table_id {
            return Err(DbError::InvalidPage(page_id));
        }
        let data = page.encode()?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset()))?;
        file.write_all(&data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Extends the file by one empty page and returns its id. Counting and
    /// writing happen under the file lock, so concurrent callers get distinct pages.
    pub fn append_empty_page(&self) -> Result<PageId> {
        let mut file = self.file.lock();
        let page_number = Self::pages_in(&file)?;
        let page_id = PageId::new(self.table_id, page_number);

        file.seek(SeekFrom::Start(page_id.file_offset()))?;
        file.write_all(&HeapPage::empty_page_data())?;
        file.flush()?;
        self.num_writes.fetch_add(1, Ordering::Relaxed);

        debug!(table = self.table_id.0, page = page_number, "appended empty page");
        Ok(page_id)
    }

    /// Inserts a tuple into the first page with a free slot, appending a page
    /// if every existing one is full. Returns the page that was modified, still pinned.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageGuard>> {
        if **tuple.schema() != *self.schema {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                found: tuple.schema().to_string(),
            });
        }

        for page_number in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_number);
            let guard = pool.get_page(tid, page_id, Permission::ReadWrite)?;
            {
                let mut page = guard.write();
                if page.num_empty_slots() == 0 {
                    continue;
                }
                page.insert_tuple(tuple)?;
                page.mark_dirty(tid);
            }
            return Ok(vec![guard]);
        }

        let page_id = self.append_empty_page()?;
        let guard = pool.get_page(tid, page_id, Permission::ReadWrite)?;
        {
            let mut page = guard.write();
            page.insert_tuple(tuple)?;
            page.mark_dirty(tid);
        }
        Ok(vec![guard])
    }

    /// Deletes the tuple at its record id. Returns the modified page, still pinned.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageGuard>> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if rid.page_id.table_id != self.table_id {
            return Err(DbError::InvalidPage(rid.page_id));
        }

        let guard = pool.get_page(tid, rid.page_id, Permission::ReadWrite)?;
        {
            let mut page = guard.write();
            page.delete_tuple(tuple)?;
            page.mark_dirty(tid);
        }
        Ok(vec![guard])
    }

    /// Returns a cursor over every tuple in the file, read through the buffer pool.
    pub fn iter(self: &Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator::new(Arc::clone(self), pool, tid)
    }

    /// Returns the number of page reads performed.
    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

/// Page-at-a-time cursor over a heap file.
///
/// Each page is fetched under a shared lock, its tuples are copied out and the
/// page is unpinned before any of them is returned. The page count is taken at
/// `open` and again at `rewind`.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    /// None until opened
    num_pages: Option<u32>,
    next_page: u32,
    buffered: VecDeque<Tuple>,
}

impl HeapFileIterator {
    fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            num_pages: None,
            next_page: 0,
            buffered: VecDeque::new(),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.num_pages = Some(self.file.num_pages()?);
        self.next_page = 0;
        self.buffered.clear();
        Ok(())
    }

    pub fn has_next(&mut self) -> Result<bool> {
        let num_pages = self.num_pages.ok_or(DbError::OperatorNotOpen)?;
        while self.buffered.is_empty() && self.next_page < num_pages {
            let page_id = PageId::new(self.file.id(), self.next_page);
            let guard = self
                .pool
                .get_page(self.tid, page_id, Permission::ReadOnly)?;
            self.buffered.extend(guard.read().iter().cloned());
            self.next_page += 1;
        }
        Ok(!self.buffered.is_empty())
    }

    pub fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        self.buffered.pop_front().ok_or(DbError::NoSuchElement)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.open()
    }

    pub fn close(&mut self) {
        self.num_pages = None;
        self.buffered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{DataType, Field};
    use tempfile::NamedTempFile;

    fn schema() -> Arc<Schema> {
        Schema::builder().column("v", DataType::Int).build_arc()
    }

    fn create_file() -> (HeapFile, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let file = HeapFile::open(temp.path(), TableId::new(7), schema()).unwrap();
        (file, temp)
    }

    #[test]
    fn test_new_file_is_empty() {
        let (file, _temp) = create_file();
        assert_eq!(file.num_pages().unwrap(), 0);
        assert!(matches!(
            file.read_page(PageId::new(TableId::new(7), 0)),
            Err(DbError::InvalidPage(_))
        ));
    }

    #[test]
    fn test_append_and_read() {
        let (file, _temp) = create_file();
        let p0 = file.append_empty_page().unwrap();
        let p1 = file.append_empty_page().unwrap();
        assert_eq!(p0.page_number, 0);
        assert_eq!(p1.page_number, 1);
        assert_eq!(file.num_pages().unwrap(), 2);

        let page = file.read_page(p1).unwrap();
        assert_eq!(page.num_empty_slots(), page.capacity());
        assert_eq!(file.num_reads(), 1);
    }

    #[test]
    fn test_write_then_read() {
        let (file, temp) = create_file();
        let pid = file.append_empty_page().unwrap();

        let mut page = file.read_page(pid).unwrap();
        let mut tuple = Tuple::new(schema(), vec![Field::Int(99)]).unwrap();
        page.insert_tuple(&mut tuple).unwrap();
        file.write_page(&page).unwrap();
        drop(file);

        let reopened = HeapFile::open(temp.path(), TableId::new(7), schema()).unwrap();
        let page = reopened.read_page(pid).unwrap();
        let values: Vec<_> = page.iter().map(|t| t.field(0).unwrap().clone()).collect();
        assert_eq!(values, vec![Field::Int(99)]);
        assert_eq!(
            std::fs::metadata(temp.path()).unwrap().len(),
            PAGE_SIZE as u64
        );
    }

    #[test]
    fn test_wrong_table_rejected() {
        let (file, _temp) = create_file();
        file.append_empty_page().unwrap();
        assert!(matches!(
            file.read_page(PageId::new(TableId::new(8), 0)),
            Err(DbError::InvalidPage(_))
        ));
    }

    #[test]
    fn test_concurrent_appends_get_distinct_pages() {
        let (file, _temp) = create_file();
        let file = Arc::new(file);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let file = Arc::clone(&file);
                std::thread::spawn(move || {
                    (0..5)
                        .map(|_| file.append_empty_page().unwrap().page_number)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut pages: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        pages.sort_unstable();
        assert_eq!(pages, (0..20).collect::<Vec<_>>());
    }
}
