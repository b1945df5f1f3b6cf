//! B+ tree node codecs over raw page bytes.
//!
//! Common node header (28 bytes): page type, LSN, size, max size,
//! parent page id, page id, key size. Leaf nodes extend the header with
//! the next-leaf sibling link. After the header come packed fixed-width
//! (key, value) pairs: leaves pair keys with RowIds, internal nodes
//! pair keys with child page ids. Slot 0 of an internal node carries no
//! meaningful key (separator-after semantics).

use crate::index::key::KeyManager;
use kestrel_common::page::{Lsn, PageId, RowId};
use std::cmp::Ordering;

/// Page type tag for leaf nodes.
pub const LEAF_PAGE_TYPE: u32 = 2;
/// Page type tag for internal nodes.
pub const INTERNAL_PAGE_TYPE: u32 = 3;

/// Size of the common node header.
pub const INTERNAL_HEADER_SIZE: usize = 28;
/// Leaf header adds the next-leaf link.
pub const LEAF_HEADER_SIZE: usize = 32;

/// Size of a leaf value (RowId: page id + slot).
pub const LEAF_VALUE_SIZE: usize = 8;
/// Size of an internal value (child page id).
pub const INTERNAL_VALUE_SIZE: usize = 4;

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    read_u32(data, offset) as i32
}

/// Accessors shared by both node kinds.
pub struct BTreeNode;

impl BTreeNode {
    /// Returns true if the page is a leaf node.
    pub fn is_leaf(data: &[u8]) -> bool {
        read_u32(data, 0) == LEAF_PAGE_TYPE
    }

    /// Returns the page LSN.
    pub fn lsn(data: &[u8]) -> Lsn {
        Lsn(read_i32(data, 4))
    }

    /// Sets the page LSN.
    pub fn set_lsn(data: &mut [u8], lsn: Lsn) {
        write_u32(data, 4, lsn.0 as u32);
    }

    /// Returns the number of stored pairs.
    pub fn size(data: &[u8]) -> usize {
        read_u32(data, 8) as usize
    }

    /// Sets the number of stored pairs.
    pub fn set_size(data: &mut [u8], size: usize) {
        write_u32(data, 8, size as u32);
    }

    /// Returns the node's capacity in pairs.
    pub fn max_size(data: &[u8]) -> usize {
        read_u32(data, 12) as usize
    }

    /// Returns the fill floor for non-root nodes.
    pub fn min_size(data: &[u8]) -> usize {
        Self::max_size(data).div_ceil(2)
    }

    /// Returns the parent page id.
    pub fn parent(data: &[u8]) -> PageId {
        PageId(read_i32(data, 16))
    }

    /// Sets the parent page id.
    pub fn set_parent(data: &mut [u8], parent: PageId) {
        write_u32(data, 16, parent.0 as u32);
    }

    /// Returns this node's page id.
    pub fn page_id(data: &[u8]) -> PageId {
        PageId(read_i32(data, 20))
    }

    /// Returns the fixed key size.
    pub fn key_size(data: &[u8]) -> usize {
        read_u32(data, 24) as usize
    }

    /// Returns true if this node has no parent.
    pub fn is_root(data: &[u8]) -> bool {
        !Self::parent(data).is_valid()
    }

    fn init_header(
        data: &mut [u8],
        page_type: u32,
        page_id: PageId,
        parent: PageId,
        key_size: usize,
        max_size: usize,
    ) {
        write_u32(data, 0, page_type);
        write_u32(data, 4, Lsn::INVALID.0 as u32);
        write_u32(data, 8, 0);
        write_u32(data, 12, max_size as u32);
        write_u32(data, 16, parent.0 as u32);
        write_u32(data, 20, page_id.0 as u32);
        write_u32(data, 24, key_size as u32);
    }
}

/// Leaf node: sorted (key, RowId) pairs plus a sibling link.
pub struct LeafNode;

impl LeafNode {
    /// Initializes an empty leaf node.
    pub fn init(
        data: &mut [u8],
        page_id: PageId,
        parent: PageId,
        key_size: usize,
        max_size: usize,
    ) {
        BTreeNode::init_header(data, LEAF_PAGE_TYPE, page_id, parent, key_size, max_size);
        Self::set_next_leaf(data, PageId::INVALID);
    }

    fn pair_size(data: &[u8]) -> usize {
        BTreeNode::key_size(data) + LEAF_VALUE_SIZE
    }

    fn pair_offset(data: &[u8], index: usize) -> usize {
        LEAF_HEADER_SIZE + index * Self::pair_size(data)
    }

    /// Returns the next leaf in the sibling chain.
    pub fn next_leaf(data: &[u8]) -> PageId {
        PageId(read_i32(data, 28))
    }

    /// Sets the next leaf in the sibling chain.
    pub fn set_next_leaf(data: &mut [u8], page_id: PageId) {
        write_u32(data, 28, page_id.0 as u32);
    }

    /// Returns the key bytes at `index`.
    pub fn key_at(data: &[u8], index: usize) -> &[u8] {
        let off = Self::pair_offset(data, index);
        &data[off..off + BTreeNode::key_size(data)]
    }

    /// Returns the row id at `index`.
    pub fn value_at(data: &[u8], index: usize) -> RowId {
        let off = Self::pair_offset(data, index) + BTreeNode::key_size(data);
        RowId::from_u64(u64::from_le_bytes([
            data[off],
            data[off + 1],
            data[off + 2],
            data[off + 3],
            data[off + 4],
            data[off + 5],
            data[off + 6],
            data[off + 7],
        ]))
    }

    fn set_pair(data: &mut [u8], index: usize, key: &[u8], value: RowId) {
        let key_size = BTreeNode::key_size(data);
        let off = Self::pair_offset(data, index);
        data[off..off + key_size].copy_from_slice(key);
        data[off + key_size..off + key_size + 8].copy_from_slice(&value.as_u64().to_le_bytes());
    }

    /// Returns the first index whose key is >= `key`.
    pub fn key_index(data: &[u8], key: &[u8], km: &KeyManager) -> usize {
        let size = BTreeNode::size(data);
        let (mut low, mut high) = (0isize, size as isize - 1);
        while low <= high {
            let mid = (low + high) / 2;
            if km.compare(Self::key_at(data, mid as usize), key) == Ordering::Less {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        low as usize
    }

    /// Point lookup for an exact key.
    pub fn lookup(data: &[u8], key: &[u8], km: &KeyManager) -> Option<RowId> {
        let index = Self::key_index(data, key, km);
        if index < BTreeNode::size(data)
            && km.compare(Self::key_at(data, index), key) == Ordering::Equal
        {
            Some(Self::value_at(data, index))
        } else {
            None
        }
    }

    /// Inserts a pair in key order. Duplicate keys leave the node
    /// unchanged. Returns the node size after the call.
    pub fn insert(data: &mut [u8], key: &[u8], value: RowId, km: &KeyManager) -> usize {
        let size = BTreeNode::size(data);
        let index = Self::key_index(data, key, km);
        if index < size && km.compare(Self::key_at(data, index), key) == Ordering::Equal {
            return size;
        }

        let start = Self::pair_offset(data, index);
        let end = Self::pair_offset(data, size);
        data.copy_within(start..end, start + Self::pair_size(data));
        Self::set_pair(data, index, key, value);
        BTreeNode::set_size(data, size + 1);
        size + 1
    }

    /// Removes the pair at `index`.
    pub fn remove_at(data: &mut [u8], index: usize) {
        let size = BTreeNode::size(data);
        let start = Self::pair_offset(data, index + 1);
        let end = Self::pair_offset(data, size);
        let dest = Self::pair_offset(data, index);
        data.copy_within(start..end, dest);
        BTreeNode::set_size(data, size - 1);
    }

    /// Removes `key` if present. Returns the node size after the call.
    pub fn remove(data: &mut [u8], key: &[u8], km: &KeyManager) -> usize {
        let size = BTreeNode::size(data);
        let index = Self::key_index(data, key, km);
        if index < size && km.compare(Self::key_at(data, index), key) == Ordering::Equal {
            Self::remove_at(data, index);
            return size - 1;
        }
        size
    }

    /// Moves the upper half of `src` into the fresh sibling `dst`.
    pub fn move_half_to(src: &mut [u8], dst: &mut [u8]) {
        let size = BTreeNode::size(src);
        let half = size / 2;
        Self::append_range(src, dst, half, size);
        BTreeNode::set_size(src, half);
    }

    /// Moves every pair of `src` to the end of `dst` and inherits the
    /// sibling link.
    pub fn move_all_to(src: &mut [u8], dst: &mut [u8]) {
        let size = BTreeNode::size(src);
        Self::append_range(src, dst, 0, size);
        Self::set_next_leaf(dst, Self::next_leaf(src));
        BTreeNode::set_size(src, 0);
    }

    /// Moves the first pair of `src` to the end of `dst`.
    pub fn move_first_to_end_of(src: &mut [u8], dst: &mut [u8]) {
        let dst_size = BTreeNode::size(dst);
        let key = Self::key_at(src, 0).to_vec();
        let value = Self::value_at(src, 0);
        Self::set_pair(dst, dst_size, &key, value);
        BTreeNode::set_size(dst, dst_size + 1);
        Self::remove_at(src, 0);
    }

    /// Moves the last pair of `src` to the front of `dst`.
    pub fn move_last_to_front_of(src: &mut [u8], dst: &mut [u8]) {
        let src_size = BTreeNode::size(src);
        let key = Self::key_at(src, src_size - 1).to_vec();
        let value = Self::value_at(src, src_size - 1);
        BTreeNode::set_size(src, src_size - 1);

        let dst_size = BTreeNode::size(dst);
        let start = Self::pair_offset(dst, 0);
        let end = Self::pair_offset(dst, dst_size);
        dst.copy_within(start..end, start + Self::pair_size(dst));
        Self::set_pair(dst, 0, &key, value);
        BTreeNode::set_size(dst, dst_size + 1);
    }

    fn append_range(src: &[u8], dst: &mut [u8], from: usize, to: usize) {
        let dst_size = BTreeNode::size(dst);
        let count = to - from;
        let src_start = Self::pair_offset(src, from);
        let src_end = Self::pair_offset(src, to);
        let dst_start = Self::pair_offset(dst, dst_size);
        dst[dst_start..dst_start + (src_end - src_start)]
            .copy_from_slice(&src[src_start..src_end]);
        BTreeNode::set_size(dst, dst_size + count);
    }
}

/// Internal node: child page ids separated by keys; slot 0's key is
/// logically invalid.
pub struct InternalNode;

impl InternalNode {
    /// Initializes an empty internal node.
    pub fn init(
        data: &mut [u8],
        page_id: PageId,
        parent: PageId,
        key_size: usize,
        max_size: usize,
    ) {
        BTreeNode::init_header(data, INTERNAL_PAGE_TYPE, page_id, parent, key_size, max_size);
    }

    fn pair_size(data: &[u8]) -> usize {
        BTreeNode::key_size(data) + INTERNAL_VALUE_SIZE
    }

    fn pair_offset(data: &[u8], index: usize) -> usize {
        INTERNAL_HEADER_SIZE + index * Self::pair_size(data)
    }

    /// Returns the key bytes at `index`. Slot 0 is logically invalid.
    pub fn key_at(data: &[u8], index: usize) -> &[u8] {
        let off = Self::pair_offset(data, index);
        &data[off..off + BTreeNode::key_size(data)]
    }

    /// Overwrites the key bytes at `index`.
    pub fn set_key_at(data: &mut [u8], index: usize, key: &[u8]) {
        let off = Self::pair_offset(data, index);
        let key_size = BTreeNode::key_size(data);
        data[off..off + key_size].copy_from_slice(key);
    }

    /// Returns the child page id at `index`.
    pub fn value_at(data: &[u8], index: usize) -> PageId {
        let off = Self::pair_offset(data, index) + BTreeNode::key_size(data);
        PageId(read_i32(data, off))
    }

    /// Sets the child page id at `index`.
    pub fn set_value_at(data: &mut [u8], index: usize, value: PageId) {
        let off = Self::pair_offset(data, index) + BTreeNode::key_size(data);
        write_u32(data, off, value.0 as u32);
    }

    /// Returns the slot holding child `value`, if any.
    pub fn value_index(data: &[u8], value: PageId) -> Option<usize> {
        (0..BTreeNode::size(data)).find(|&i| Self::value_at(data, i) == value)
    }

    /// Returns the child to descend into for `key`.
    ///
    /// Separator-after rule: binary search over keys 1..size-1; a
    /// separator <= the probe sends the search right of it.
    pub fn lookup(data: &[u8], key: &[u8], km: &KeyManager) -> PageId {
        let size = BTreeNode::size(data);
        let (mut low, mut high) = (1isize, size as isize - 1);
        while low <= high {
            let mid = (low + high) / 2;
            if km.compare(Self::key_at(data, mid as usize), key) != Ordering::Greater {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        Self::value_at(data, high as usize)
    }

    /// Fills a fresh root after the old root split.
    pub fn populate_new_root(data: &mut [u8], old_child: PageId, key: &[u8], new_child: PageId) {
        BTreeNode::set_size(data, 2);
        Self::set_value_at(data, 0, old_child);
        Self::set_key_at(data, 1, key);
        Self::set_value_at(data, 1, new_child);
    }

    /// Inserts (key, new_child) immediately after the slot holding
    /// `old_child`. Returns the node size after the call.
    pub fn insert_node_after(
        data: &mut [u8],
        old_child: PageId,
        key: &[u8],
        new_child: PageId,
    ) -> usize {
        let size = BTreeNode::size(data);
        let Some(index) = Self::value_index(data, old_child) else {
            return size;
        };

        let start = Self::pair_offset(data, index + 1);
        let end = Self::pair_offset(data, size);
        data.copy_within(start..end, start + Self::pair_size(data));
        Self::set_key_at(data, index + 1, key);
        Self::set_value_at(data, index + 1, new_child);
        BTreeNode::set_size(data, size + 1);
        size + 1
    }

    /// Removes the pair at `index`, keeping the rest contiguous.
    pub fn remove(data: &mut [u8], index: usize) {
        let size = BTreeNode::size(data);
        let start = Self::pair_offset(data, index + 1);
        let end = Self::pair_offset(data, size);
        let dest = Self::pair_offset(data, index);
        data.copy_within(start..end, dest);
        BTreeNode::set_size(data, size - 1);
    }

    /// Collapses a one-child root, returning the surviving child.
    pub fn remove_and_return_only_child(data: &mut [u8]) -> PageId {
        let child = Self::value_at(data, 0);
        BTreeNode::set_size(data, 0);
        child
    }

    /// Moves the upper half of `src` into the fresh sibling `dst`.
    ///
    /// Returns the number of pairs moved; the caller re-parents the
    /// children now referenced by `dst`.
    pub fn move_half_to(src: &mut [u8], dst: &mut [u8]) -> usize {
        let size = BTreeNode::size(src);
        let half = size / 2;
        let count = size - half;
        Self::append_range(src, dst, half, size);
        BTreeNode::set_size(src, half);
        count
    }

    /// Moves every pair of `src` to the end of `dst`, folding the
    /// parent separator in as the first moved key.
    ///
    /// Returns the dst index of the first moved pair; the caller
    /// re-parents the moved children.
    pub fn move_all_to(src: &mut [u8], dst: &mut [u8], middle_key: &[u8]) -> usize {
        let start = BTreeNode::size(dst);
        let size = BTreeNode::size(src);
        Self::append_range(src, dst, 0, size);
        Self::set_key_at(dst, start, middle_key);
        BTreeNode::set_size(src, 0);
        start
    }

    /// Appends (key, value) at the end of the node.
    pub fn copy_last_from(data: &mut [u8], key: &[u8], value: PageId) {
        let size = BTreeNode::size(data);
        Self::set_key_at(data, size, key);
        Self::set_value_at(data, size, value);
        BTreeNode::set_size(data, size + 1);
    }

    /// Prepends `value` as the new slot 0, shifting everything right.
    pub fn copy_first_from(data: &mut [u8], value: PageId) {
        let size = BTreeNode::size(data);
        let start = Self::pair_offset(data, 0);
        let end = Self::pair_offset(data, size);
        data.copy_within(start..end, start + Self::pair_size(data));
        Self::set_value_at(data, 0, value);
        BTreeNode::set_size(data, size + 1);
    }

    fn append_range(src: &[u8], dst: &mut [u8], from: usize, to: usize) {
        let dst_size = BTreeNode::size(dst);
        let count = to - from;
        let src_start = Self::pair_offset(src, from);
        let src_end = Self::pair_offset(src, to);
        let dst_start = Self::pair_offset(dst, dst_size);
        dst[dst_start..dst_start + (src_end - src_start)]
            .copy_from_slice(&src[src_start..src_end]);
        BTreeNode::set_size(dst, dst_size + count);
    }
}
