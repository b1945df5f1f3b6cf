//! Backing page store consumed by the buffer pool.

use kestrel_common::page::{PageId, PAGE_SIZE};
use kestrel_common::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Interface to the page allocator and pager underneath the buffer pool.
///
/// The disk manager implements this for the real database file; tests use
/// [`MemoryPageStore`]. The pool only ever needs allocation, deallocation,
/// and whole-page reads and writes.
pub trait PageStore: Send + Sync {
    /// Allocates a fresh page id.
    fn allocate_page(&self) -> Result<PageId>;

    /// Releases a page id back to the allocator.
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;

    /// Reads a page into `buf`. Never-written pages read as zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes a full page.
    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()>;
}

/// In-memory page store used by buffer pool unit tests.
pub struct MemoryPageStore {
    inner: Mutex<MemoryStoreInner>,
}

struct MemoryStoreInner {
    pages: HashMap<PageId, Box<[u8; PAGE_SIZE]>>,
    next_page_id: i32,
}

impl MemoryPageStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryStoreInner {
                pages: HashMap::new(),
                next_page_id: 0,
            }),
        }
    }

    /// Returns the number of pages ever written.
    pub fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }
}

impl Default for MemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for MemoryPageStore {
    fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let page_id = PageId(inner.next_page_id);
        inner.next_page_id += 1;
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.inner.lock().pages.remove(&page_id);
        Ok(())
    }

    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let inner = self.inner.lock();
        match inner.pages.get(&page_id) {
            Some(data) => buf.copy_from_slice(&**data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.pages.insert(page_id, Box::new(*buf));
        Ok(())
    }
}
