//! Buffer pool manager.

use crate::frame::{Frame, FrameId};
use crate::replacer::{LruReplacer, Replacer};
use crate::store::PageStore;
use kestrel_common::page::{PageId, PAGE_SIZE};
use kestrel_common::{DbError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use sysinfo::System;
use tracing::error;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub pool_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { pool_size: 1024 }
    }
}

/// Buffer pool manager.
///
/// Caches pages from the backing store in a fixed array of frames:
/// - page table mapping resident page ids to frames
/// - free list of unused frames, consulted before the replacer
/// - pluggable replacement policy for eviction (LRU by default)
/// - pin counting so resident pages cannot be evicted while in use
///
/// Dirty frames are written back to the store before their frame is
/// reused, so an unpinned dirty page is never lost to eviction.
pub struct BufferPoolManager {
    /// Number of frames.
    pool_size: usize,
    /// Array of buffer frames.
    frames: Vec<Frame>,
    /// Page table and free list, guarded together.
    inner: Mutex<PoolInner>,
    /// Page replacement policy.
    replacer: Box<dyn Replacer>,
    /// Backing page store.
    store: Arc<dyn PageStore>,
}

struct PoolInner {
    /// Maps resident page ids to their frames. Injective by construction.
    page_table: HashMap<PageId, FrameId>,
    /// Frames that have never held a page or were freed by delete_page.
    free_list: VecDeque<FrameId>,
}

impl BufferPoolManager {
    /// Creates a new buffer pool with the LRU replacement policy.
    pub fn new(config: BufferPoolConfig, store: Arc<dyn PageStore>) -> Self {
        let replacer = Box::new(LruReplacer::new(config.pool_size));
        Self::with_replacer(config, store, replacer)
    }

    /// Creates a new buffer pool with the given replacement policy.
    pub fn with_replacer(
        config: BufferPoolConfig,
        store: Arc<dyn PageStore>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let pool_size = config.pool_size;
        let frames: Vec<_> = (0..pool_size).map(|i| Frame::new(FrameId(i as u32))).collect();
        let free_list: VecDeque<_> = (0..pool_size).map(|i| FrameId(i as u32)).collect();

        Self {
            pool_size,
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer,
            store,
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames so caching stays useful on small machines.
    pub fn auto_sized(store: Arc<dyn PageStore>) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let pool_size = (available_bytes / 4 / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { pool_size }, store)
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    /// Returns the number of pages currently cached.
    pub fn page_count(&self) -> usize {
        self.inner.lock().page_table.len()
    }

    /// Checks if a page is cached.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().page_table.contains_key(&page_id)
    }

    /// Selects a frame for a new resident page: free list first, then a
    /// replacer victim. Writes back the victim's page if dirty and drops
    /// its page table entry.
    ///
    /// Caller must hold the inner lock.
    fn take_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(DbError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.0 as usize];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                let data = frame.read_data();
                self.store.write_page(old_page_id, &data)?;
            }
            inner.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }

    /// Fetches a page, pinning it.
    ///
    /// If the page is cached its pin count is incremented; otherwise a
    /// frame is selected, the page is read from the store, and the frame
    /// is returned with pin count 1. Fails with `BufferPoolFull` only
    /// when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.pin(frame_id);
            return Ok(frame);
        }

        let frame_id = self.take_frame(&mut inner)?;
        let frame = &self.frames[frame_id.0 as usize];

        frame.reset();
        {
            let mut data = frame.write_data();
            self.store.read_page(page_id, &mut data)?;
        }
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.replacer.pin(frame_id);
        inner.page_table.insert(page_id, frame_id);

        Ok(frame)
    }

    /// Allocates a fresh page and pins it in a zeroed frame.
    ///
    /// Returns the new page id together with its frame.
    pub fn new_page(&self) -> Result<(PageId, &Frame)> {
        let mut inner = self.inner.lock();

        let frame_id = self.take_frame(&mut inner)?;
        let frame = &self.frames[frame_id.0 as usize];

        let page_id = self.store.allocate_page()?;

        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.replacer.pin(frame_id);
        inner.page_table.insert(page_id, frame_id);

        Ok((page_id, frame))
    }

    /// Unpins a page, OR-accumulating the dirty flag.
    ///
    /// When the pin count reaches zero the frame becomes a victim
    /// candidate. Returns false if the page is not cached or was already
    /// fully unpinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0 as usize];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes a cached page to the store and clears its dirty flag.
    ///
    /// Does not unpin. Returns false if the page is not cached.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.0 as usize];
        let data = frame.read_data();
        self.store.write_page(page_id, &data)?;
        drop(data);
        frame.set_dirty(false);
        Ok(true)
    }

    /// Flushes every cached page. Returns the number written.
    pub fn flush_all(&self) -> Result<usize> {
        let inner = self.inner.lock();
        let mut flushed = 0;

        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.frames[frame_id.0 as usize];
            let data = frame.read_data();
            self.store.write_page(page_id, &data)?;
            drop(data);
            frame.set_dirty(false);
            flushed += 1;
        }
        Ok(flushed)
    }

    /// Drops a page from the pool and deallocates it on the store.
    ///
    /// Succeeds if the page is uncached or its pin count is zero; a
    /// pinned page cannot be deleted and the call returns false.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            self.store.deallocate_page(page_id)?;
            return Ok(true);
        };

        let frame = &self.frames[frame_id.0 as usize];
        if frame.pin_count() != 0 {
            return Ok(false);
        }

        if frame.is_dirty() {
            let data = frame.read_data();
            self.store.write_page(page_id, &data)?;
        }
        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.store.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns true when no frame holds a pin.
    ///
    /// Engine-idle invariant check: every fetch or new_page must have
    /// been matched by exactly one unpin.
    pub fn check_all_unpinned(&self) -> bool {
        let mut all_unpinned = true;
        for frame in &self.frames {
            let pins = frame.pin_count();
            if pins != 0 {
                all_unpinned = false;
                error!(
                    page_id = ?frame.page_id(),
                    pin_count = pins,
                    "page left pinned at engine-idle boundary"
                );
            }
        }
        all_unpinned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replacer::ClockReplacer;
    use crate::store::MemoryPageStore;

    fn create_test_pool(pool_size: usize) -> BufferPoolManager {
        let store = Arc::new(MemoryPageStore::new());
        BufferPoolManager::new(BufferPoolConfig { pool_size }, store)
    }

    #[test]
    fn test_pool_new() {
        let pool = create_test_pool(10);

        assert_eq!(pool.pool_size(), 10);
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_new_page_pinned() {
        let pool = create_test_pool(10);

        let (page_id, frame) = pool.new_page().unwrap();
        assert_eq!(frame.page_id(), Some(page_id));
        assert_eq!(frame.pin_count(), 1);
        assert_eq!(pool.free_count(), 9);
        assert!(pool.contains(page_id));
    }

    #[test]
    fn test_fetch_cached_increments_pin() {
        let pool = create_test_pool(10);

        let (page_id, _) = pool.new_page().unwrap();
        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.pin_count(), 2);

        assert!(pool.unpin_page(page_id, false));
        assert!(pool.unpin_page(page_id, false));
        assert!(!pool.unpin_page(page_id, false));
    }

    #[test]
    fn test_fetch_reads_from_store() {
        let store = Arc::new(MemoryPageStore::new());
        let pool = BufferPoolManager::new(BufferPoolConfig { pool_size: 3 }, store.clone());

        let page_id = store.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[17] = 0x5A;
        store.write_page(page_id, &data).unwrap();

        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.read_data()[17], 0x5A);
        pool.unpin_page(page_id, false);
    }

    #[test]
    fn test_dirty_eviction_writes_back() {
        let store = Arc::new(MemoryPageStore::new());
        let pool = BufferPoolManager::new(BufferPoolConfig { pool_size: 1 }, store.clone());

        let (page_id, frame) = pool.new_page().unwrap();
        frame.write_data()[0] = 0xAB;
        pool.unpin_page(page_id, true);

        // Evicts the dirty page, which must reach the store first.
        let (page_id2, _) = pool.new_page().unwrap();
        assert_ne!(page_id, page_id2);
        assert!(!pool.contains(page_id));

        let mut out = [0u8; PAGE_SIZE];
        store.read_page(page_id, &mut out).unwrap();
        assert_eq!(out[0], 0xAB);
    }

    #[test]
    fn test_all_pinned_fails() {
        let pool = create_test_pool(2);

        pool.new_page().unwrap();
        pool.new_page().unwrap();

        assert!(matches!(pool.new_page(), Err(DbError::BufferPoolFull)));
        assert!(matches!(
            pool.fetch_page(PageId(99)),
            Err(DbError::BufferPoolFull)
        ));
    }

    #[test]
    fn test_unpin_dirty_accumulates() {
        let pool = create_test_pool(4);

        let (page_id, frame) = pool.new_page().unwrap();
        pool.fetch_page(page_id).unwrap();

        // Dirty from the first unpin survives a clean second unpin.
        assert!(pool.unpin_page(page_id, true));
        assert!(pool.unpin_page(page_id, false));
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_flush_page_clears_dirty() {
        let store = Arc::new(MemoryPageStore::new());
        let pool = BufferPoolManager::new(BufferPoolConfig { pool_size: 4 }, store.clone());

        let (page_id, frame) = pool.new_page().unwrap();
        frame.write_data()[3] = 9;
        pool.unpin_page(page_id, true);

        assert!(pool.flush_page(page_id).unwrap());
        assert!(!frame.is_dirty());

        let mut out = [0u8; PAGE_SIZE];
        store.read_page(page_id, &mut out).unwrap();
        assert_eq!(out[3], 9);

        assert!(!pool.flush_page(PageId(1234)).unwrap());
    }

    #[test]
    fn test_flush_all() {
        let pool = create_test_pool(8);

        for _ in 0..5 {
            let (page_id, _) = pool.new_page().unwrap();
            pool.unpin_page(page_id, true);
        }

        assert_eq!(pool.flush_all().unwrap(), 5);
    }

    #[test]
    fn test_delete_page() {
        let pool = create_test_pool(4);

        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        assert!(pool.delete_page(page_id).unwrap());
        assert!(!pool.contains(page_id));
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn test_delete_pinned_page_fails() {
        let pool = create_test_pool(4);

        let (page_id, _) = pool.new_page().unwrap();
        assert!(!pool.delete_page(page_id).unwrap());
        assert!(pool.contains(page_id));
    }

    #[test]
    fn test_delete_uncached_page_deallocates() {
        let store = Arc::new(MemoryPageStore::new());
        let pool = BufferPoolManager::new(BufferPoolConfig { pool_size: 2 }, store.clone());

        let page_id = store.allocate_page().unwrap();
        store.write_page(page_id, &[1u8; PAGE_SIZE]).unwrap();
        assert!(pool.delete_page(page_id).unwrap());
        assert_eq!(store.page_count(), 0);
    }

    #[test]
    fn test_eviction_prefers_lru() {
        let pool = create_test_pool(3);

        let (p1, _) = pool.new_page().unwrap();
        let (p2, _) = pool.new_page().unwrap();
        let (p3, _) = pool.new_page().unwrap();

        pool.unpin_page(p1, false);
        pool.unpin_page(p2, false);
        pool.unpin_page(p3, false);

        // Touch p1 so p2 becomes the least recently unpinned.
        pool.fetch_page(p1).unwrap();
        pool.unpin_page(p1, false);

        let (_, _) = pool.new_page().unwrap();
        assert!(pool.contains(p1));
        assert!(!pool.contains(p2));
        assert!(pool.contains(p3));
    }

    #[test]
    fn test_page_table_injective() {
        let pool = create_test_pool(4);
        let mut pages = Vec::new();

        for _ in 0..4 {
            let (page_id, _) = pool.new_page().unwrap();
            pages.push(page_id);
            pool.unpin_page(page_id, false);
        }

        // Re-fetch everything; each page must land in exactly one frame.
        let mut frame_ids = std::collections::HashSet::new();
        for &page_id in &pages {
            let frame = pool.fetch_page(page_id).unwrap();
            assert!(frame_ids.insert(frame.frame_id()));
            pool.unpin_page(page_id, false);
        }
    }

    #[test]
    fn test_check_all_unpinned() {
        let pool = create_test_pool(4);

        let (page_id, _) = pool.new_page().unwrap();
        assert!(!pool.check_all_unpinned());

        pool.unpin_page(page_id, false);
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_clock_replacer_pool() {
        let store = Arc::new(MemoryPageStore::new());
        let pool = BufferPoolManager::with_replacer(
            BufferPoolConfig { pool_size: 3 },
            store,
            Box::new(ClockReplacer::new(3)),
        );

        let mut pages = Vec::new();
        for _ in 0..3 {
            let (page_id, _) = pool.new_page().unwrap();
            pages.push(page_id);
            pool.unpin_page(page_id, false);
        }

        // A fourth page evicts someone; the pool stays at capacity.
        let (p4, _) = pool.new_page().unwrap();
        assert_eq!(pool.page_count(), 3);
        assert!(pool.contains(p4));
    }
}
