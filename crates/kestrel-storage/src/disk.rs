//! Disk manager for page-level file I/O with bitmap allocation.
//!
//! The database lives in a single file of PAGE_SIZE blocks. Physical
//! block 0 is the disk meta page; after it, extents alternate one
//! bitmap page with the `BITMAP_CAPACITY` data pages it tracks. Logical
//! page ids are dense and translated to physical offsets here; callers
//! never see the meta or bitmap pages.

use crate::bitmap::{BitmapPage, DiskMetaPage, BITMAP_CAPACITY, MAX_EXTENTS};
use kestrel_buffer::PageStore;
use kestrel_common::page::{PageId, PAGE_SIZE};
use kestrel_common::{DbError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Path of the database file.
    pub db_path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./kestrel.db"),
            fsync_enabled: true,
        }
    }
}

/// Manages reading and writing pages of the database file and hands out
/// logical page ids from the bitmap extents.
pub struct DiskManager {
    config: DiskManagerConfig,
    inner: Mutex<DiskInner>,
}

struct DiskInner {
    file: File,
    meta: DiskMetaPage,
}

/// Pages per extent on disk: one bitmap page plus its data pages.
const EXTENT_PAGES: u64 = BITMAP_CAPACITY as u64 + 1;

/// Physical block index of the bitmap page for `extent`.
fn bitmap_physical(extent: u32) -> u64 {
    1 + extent as u64 * EXTENT_PAGES
}

/// Physical block index of a logical page id.
fn data_physical(page_id: PageId) -> u64 {
    let logical = page_id.0 as u64;
    let extent = logical / BITMAP_CAPACITY as u64;
    let index = logical % BITMAP_CAPACITY as u64;
    1 + extent * EXTENT_PAGES + 1 + index
}

impl DiskManager {
    /// Opens or creates the database file.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.db_path)?;

        let meta = if file.metadata()?.len() >= PAGE_SIZE as u64 {
            let mut buf = [0u8; PAGE_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            DiskMetaPage::from_bytes(buf)
        } else {
            let meta = DiskMetaPage::new();
            file.seek(SeekFrom::Start(0))?;
            file.write_all(meta.as_bytes())?;
            meta
        };

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner { file, meta }),
        })
    }

    /// Returns the database file path.
    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    /// Returns the total number of allocated data pages.
    pub fn num_allocated_pages(&self) -> u32 {
        self.inner.lock().meta.num_allocated_pages()
    }

    /// Reads a physical block, zero-filling past the end of the file.
    fn read_physical(file: &mut File, block: u64, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let offset = block * PAGE_SIZE as u64;
        let len = file.metadata()?.len();
        if offset >= len {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < PAGE_SIZE {
            let n = file.read(&mut buf[read..])?;
            if n == 0 {
                buf[read..].fill(0);
                break;
            }
            read += n;
        }
        Ok(())
    }

    /// Writes a physical block.
    fn write_physical(&self, file: &mut File, block: u64, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        file.seek(SeekFrom::Start(block * PAGE_SIZE as u64))?;
        file.write_all(buf)?;
        if self.config.fsync_enabled {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Allocates a logical page id.
    ///
    /// Scans existing extents for a free bit and opens a new extent
    /// when all are full. The bitmap and meta pages are written through
    /// before the id is returned.
    pub fn allocate(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let DiskInner { file, meta } = &mut *inner;

        let num_extents = meta.num_extents();
        let extent = (0..num_extents)
            .find(|&e| (meta.extent_used_pages(e) as usize) < BITMAP_CAPACITY)
            .unwrap_or(num_extents);

        if extent as usize >= MAX_EXTENTS {
            return Err(DbError::Internal("database file full".to_string()));
        }

        let mut bitmap_buf = [0u8; PAGE_SIZE];
        Self::read_physical(file, bitmap_physical(extent), &mut bitmap_buf)?;
        let mut bitmap = BitmapPage::from_bytes(bitmap_buf);

        let offset = bitmap
            .allocate_page()
            .ok_or_else(|| DbError::Internal("bitmap extent unexpectedly full".to_string()))?;

        self.write_physical(file, bitmap_physical(extent), bitmap.as_bytes())?;

        if extent == num_extents {
            meta.set_num_extents(num_extents + 1);
        }
        meta.set_extent_used_pages(extent, meta.extent_used_pages(extent) + 1);
        meta.set_num_allocated_pages(meta.num_allocated_pages() + 1);
        self.write_physical(file, 0, meta.as_bytes())?;

        Ok(PageId(extent as i32 * BITMAP_CAPACITY as i32 + offset as i32))
    }

    /// Releases a logical page id back to its extent's bitmap.
    pub fn deallocate(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id.0));
        }

        let mut inner = self.inner.lock();
        let DiskInner { file, meta } = &mut *inner;

        let extent = (page_id.0 as usize / BITMAP_CAPACITY) as u32;
        let offset = (page_id.0 as usize % BITMAP_CAPACITY) as u32;
        if extent >= meta.num_extents() {
            return Err(DbError::InvalidPageId(page_id.0));
        }

        let mut bitmap_buf = [0u8; PAGE_SIZE];
        Self::read_physical(file, bitmap_physical(extent), &mut bitmap_buf)?;
        let mut bitmap = BitmapPage::from_bytes(bitmap_buf);

        if !bitmap.deallocate_page(offset) {
            warn!(page_id = page_id.0, "deallocating a page that is already free");
            return Ok(());
        }

        self.write_physical(file, bitmap_physical(extent), bitmap.as_bytes())?;

        meta.set_extent_used_pages(extent, meta.extent_used_pages(extent) - 1);
        meta.set_num_allocated_pages(meta.num_allocated_pages() - 1);
        self.write_physical(file, 0, meta.as_bytes())?;
        Ok(())
    }

    /// Returns true if the logical page id is not allocated.
    pub fn is_page_free(&self, page_id: PageId) -> bool {
        if !page_id.is_valid() {
            return false;
        }

        let mut inner = self.inner.lock();
        let DiskInner { file, meta } = &mut *inner;

        let extent = (page_id.0 as usize / BITMAP_CAPACITY) as u32;
        let offset = (page_id.0 as usize % BITMAP_CAPACITY) as u32;
        if extent >= meta.num_extents() {
            return true;
        }

        let mut bitmap_buf = [0u8; PAGE_SIZE];
        if Self::read_physical(file, bitmap_physical(extent), &mut bitmap_buf).is_err() {
            return false;
        }
        BitmapPage::from_bytes(bitmap_buf).is_page_free(offset)
    }

    /// Reads a logical page. Never-written pages read as zeroes.
    pub fn read(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id.0));
        }
        let mut inner = self.inner.lock();
        Self::read_physical(&mut inner.file, data_physical(page_id), buf)
    }

    /// Writes a logical page.
    pub fn write(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id.0));
        }
        let mut inner = self.inner.lock();
        let DiskInner { file, .. } = &mut *inner;
        self.write_physical(file, data_physical(page_id), buf)
    }
}

impl PageStore for DiskManager {
    fn allocate_page(&self) -> Result<PageId> {
        self.allocate()
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.deallocate(page_id)
    }

    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        self.read(page_id, buf)
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        self.write(page_id, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_disk_manager() -> (DiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = DiskManagerConfig {
            db_path: dir.path().join("test.db"),
            fsync_enabled: false,
        };
        let dm = DiskManager::new(config).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_disk_manager_new() {
        let (dm, _dir) = create_test_disk_manager();
        assert!(dm.db_path().exists());
        assert_eq!(dm.num_allocated_pages(), 0);
    }

    #[test]
    fn test_allocate_sequential_ids() {
        let (dm, _dir) = create_test_disk_manager();

        assert_eq!(dm.allocate().unwrap(), PageId(0));
        assert_eq!(dm.allocate().unwrap(), PageId(1));
        assert_eq!(dm.allocate().unwrap(), PageId(2));
        assert_eq!(dm.num_allocated_pages(), 3);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        dm.write(page_id, &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read(page_id, &mut out).unwrap();
        assert_eq!(out[0], 0xAB);
        assert_eq!(out[100], 0xCD);
        assert_eq!(out[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_unwritten_page_reads_zeroed() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate().unwrap();
        let mut out = [0xFFu8; PAGE_SIZE];
        dm.read(page_id, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_is_page_free() {
        let (dm, _dir) = create_test_disk_manager();

        let page_id = dm.allocate().unwrap();
        assert!(!dm.is_page_free(page_id));
        assert!(dm.is_page_free(PageId(1)));
        assert!(!dm.is_page_free(PageId::INVALID));

        dm.deallocate(page_id).unwrap();
        assert!(dm.is_page_free(page_id));
    }

    #[test]
    fn test_deallocate_and_reuse() {
        let (dm, _dir) = create_test_disk_manager();

        let p0 = dm.allocate().unwrap();
        let _p1 = dm.allocate().unwrap();

        dm.deallocate(p0).unwrap();
        assert_eq!(dm.num_allocated_pages(), 1);

        // The freed id is handed out again before extending the extent.
        assert_eq!(dm.allocate().unwrap(), p0);
    }

    #[test]
    fn test_deallocate_invalid() {
        let (dm, _dir) = create_test_disk_manager();

        assert!(dm.deallocate(PageId::INVALID).is_err());
        assert!(dm.deallocate(PageId(BITMAP_CAPACITY as i32 * 5)).is_err());
    }

    #[test]
    fn test_pages_do_not_alias() {
        let (dm, _dir) = create_test_disk_manager();

        let p0 = dm.allocate().unwrap();
        let p1 = dm.allocate().unwrap();

        dm.write(p0, &[0x11u8; PAGE_SIZE]).unwrap();
        dm.write(p1, &[0x22u8; PAGE_SIZE]).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read(p0, &mut out).unwrap();
        assert_eq!(out[0], 0x11);
        dm.read(p1, &mut out).unwrap();
        assert_eq!(out[0], 0x22);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let page_id;

        {
            let dm = DiskManager::new(DiskManagerConfig {
                db_path: path.clone(),
                fsync_enabled: true,
            })
            .unwrap();
            page_id = dm.allocate().unwrap();
            dm.write(page_id, &[0x77u8; PAGE_SIZE]).unwrap();
        }

        {
            let dm = DiskManager::new(DiskManagerConfig {
                db_path: path,
                fsync_enabled: true,
            })
            .unwrap();
            assert_eq!(dm.num_allocated_pages(), 1);
            assert!(!dm.is_page_free(page_id));

            let mut out = [0u8; PAGE_SIZE];
            dm.read(page_id, &mut out).unwrap();
            assert_eq!(out[0], 0x77);

            // Allocation continues after the persisted pages.
            assert_eq!(dm.allocate().unwrap(), PageId(1));
        }
    }

    #[test]
    fn test_physical_mapping_reserves_meta_and_bitmap() {
        assert_eq!(data_physical(PageId(0)), 2);
        assert_eq!(data_physical(PageId(1)), 3);
        assert_eq!(bitmap_physical(0), 1);

        let second_extent_first = PageId(BITMAP_CAPACITY as i32);
        assert_eq!(
            data_physical(second_extent_first),
            1 + EXTENT_PAGES + 1
        );
        assert_eq!(bitmap_physical(1), 1 + EXTENT_PAGES);
    }
}
