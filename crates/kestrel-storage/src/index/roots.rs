//! The shared index-roots page.
//!
//! Every B+ tree persists its root page id here so an index can be
//! reopened by id alone. Layout:
//! ```text
//! u32 count
//! (u32 index_id, i32 root_page_id) x count
//! ```

use kestrel_common::page::{PageId, PAGE_SIZE};

/// Logical page holding every index's root page id.
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(1);

/// Maximum number of indexes the roots page can track.
const MAX_ROOTS: usize = (PAGE_SIZE - 4) / 8;

/// Codec for the index-roots page.
pub struct IndexRootsPage;

impl IndexRootsPage {
    fn count(data: &[u8]) -> usize {
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize
    }

    fn set_count(data: &mut [u8], count: usize) {
        data[0..4].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn entry(data: &[u8], slot: usize) -> (u32, PageId) {
        let off = 4 + slot * 8;
        let index_id = u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);
        let root = i32::from_le_bytes([data[off + 4], data[off + 5], data[off + 6], data[off + 7]]);
        (index_id, PageId(root))
    }

    fn set_entry(data: &mut [u8], slot: usize, index_id: u32, root: PageId) {
        let off = 4 + slot * 8;
        data[off..off + 4].copy_from_slice(&index_id.to_le_bytes());
        data[off + 4..off + 8].copy_from_slice(&root.0.to_le_bytes());
    }

    fn find(data: &[u8], index_id: u32) -> Option<usize> {
        (0..Self::count(data)).find(|&slot| Self::entry(data, slot).0 == index_id)
    }

    /// Returns the recorded root page of `index_id`.
    pub fn get_root(data: &[u8], index_id: u32) -> Option<PageId> {
        Self::find(data, index_id).map(|slot| Self::entry(data, slot).1)
    }

    /// Registers a new index. Returns false if it is already present
    /// or the page is full.
    pub fn insert(data: &mut [u8], index_id: u32, root: PageId) -> bool {
        if Self::find(data, index_id).is_some() {
            return false;
        }
        let count = Self::count(data);
        if count >= MAX_ROOTS {
            return false;
        }
        Self::set_entry(data, count, index_id, root);
        Self::set_count(data, count + 1);
        true
    }

    /// Updates an index's root. Returns false if it is not registered.
    pub fn update(data: &mut [u8], index_id: u32, root: PageId) -> bool {
        match Self::find(data, index_id) {
            Some(slot) => {
                Self::set_entry(data, slot, index_id, root);
                true
            }
            None => false,
        }
    }

    /// Unregisters an index. Returns false if it is not registered.
    pub fn remove(data: &mut [u8], index_id: u32) -> bool {
        match Self::find(data, index_id) {
            Some(slot) => {
                let count = Self::count(data);
                let last = Self::entry(data, count - 1);
                Self::set_entry(data, slot, last.0, last.1);
                Self::set_count(data, count - 1);
                true
            }
            None => false,
        }
    }
}
