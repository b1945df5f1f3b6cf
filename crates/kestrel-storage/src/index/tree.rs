//! Disk-resident B+ tree with split, coalesce, and redistribute.

use crate::index::key::KeyManager;
use crate::index::node::{
    BTreeNode, InternalNode, LeafNode, INTERNAL_HEADER_SIZE, INTERNAL_VALUE_SIZE,
    LEAF_HEADER_SIZE, LEAF_VALUE_SIZE,
};
use crate::index::roots::{IndexRootsPage, INDEX_ROOTS_PAGE_ID};
use crate::record::Row;
use kestrel_buffer::{BufferPoolManager, Frame};
use kestrel_common::page::{PageId, RowId, PAGE_SIZE};
use kestrel_common::{DbError, Result};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI32, Ordering as AtomicOrdering};
use std::sync::Arc;

/// A unique-key B+ tree over buffer pool pages.
///
/// Nodes accept pairs until they hold `max_size` entries; an insert
/// arriving at a full node splits it first. A non-root node dropping
/// below `⌈max_size/2⌉` borrows from a sibling when the two together
/// overflow one node, and merges with it otherwise. Root page ids are
/// persisted in the shared index-roots page.
pub struct BPlusTree {
    index_id: u32,
    buffer_pool: Arc<BufferPoolManager>,
    processor: KeyManager,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: AtomicI32,
}

impl BPlusTree {
    /// Opens (or registers) the tree for `index_id`.
    ///
    /// Order parameters default to what fits in a page for the key
    /// size, minus one slot of headroom.
    pub fn new(
        index_id: u32,
        buffer_pool: Arc<BufferPoolManager>,
        processor: KeyManager,
        leaf_max_size: Option<usize>,
        internal_max_size: Option<usize>,
    ) -> Result<Self> {
        let key_size = processor.key_size();
        let leaf_max_size = leaf_max_size.unwrap_or(
            (PAGE_SIZE - LEAF_HEADER_SIZE) / (key_size + LEAF_VALUE_SIZE) - 1,
        );
        let internal_max_size = internal_max_size.unwrap_or(
            (PAGE_SIZE - INTERNAL_HEADER_SIZE) / (key_size + INTERNAL_VALUE_SIZE) - 1,
        );

        let frame = buffer_pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        let registered = IndexRootsPage::get_root(&frame.read_data()[..], index_id);
        let root = match registered {
            Some(root) => root,
            None => {
                IndexRootsPage::insert(&mut frame.write_data()[..], index_id, PageId::INVALID);
                PageId::INVALID
            }
        };
        buffer_pool.unpin_page(INDEX_ROOTS_PAGE_ID, registered.is_none());

        Ok(Self {
            index_id,
            buffer_pool,
            processor,
            leaf_max_size,
            internal_max_size,
            root_page_id: AtomicI32::new(root.0),
        })
    }

    /// Returns this tree's index id.
    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    /// Returns the key manager.
    pub fn key_manager(&self) -> &KeyManager {
        &self.processor
    }

    /// Returns the current root page id.
    pub fn root_page_id(&self) -> PageId {
        PageId(self.root_page_id.load(AtomicOrdering::Acquire))
    }

    fn set_root(&self, page_id: PageId) {
        self.root_page_id.store(page_id.0, AtomicOrdering::Release);
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    /// Persists the current root page id in the index-roots page.
    fn update_root_on_disk(&self) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        IndexRootsPage::update(&mut frame.write_data()[..], self.index_id, self.root_page_id());
        self.buffer_pool.unpin_page(INDEX_ROOTS_PAGE_ID, true);
        Ok(())
    }

    /// Descends to the leaf for `key` (or the leftmost leaf).
    ///
    /// The returned leaf is pinned; the caller unpins it.
    fn find_leaf(&self, key: Option<&[u8]>, leftmost: bool) -> Result<(PageId, &Frame)> {
        let mut page_id = self.root_page_id();
        if !page_id.is_valid() {
            return Err(DbError::KeyNotFound);
        }

        let mut frame = self.buffer_pool.fetch_page(page_id)?;
        loop {
            let data = frame.read_data();
            if BTreeNode::is_leaf(&data[..]) {
                drop(data);
                return Ok((page_id, frame));
            }
            let child = if leftmost {
                InternalNode::value_at(&data[..], 0)
            } else {
                InternalNode::lookup(&data[..], key.expect("key required"), &self.processor)
            };
            drop(data);
            self.buffer_pool.unpin_page(page_id, false);
            page_id = child;
            frame = self.buffer_pool.fetch_page(page_id)?;
        }
    }

    /// Point lookup.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RowId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (page_id, frame) = self.find_leaf(Some(key), false)?;
        let result = LeafNode::lookup(&frame.read_data()[..], key, &self.processor);
        self.buffer_pool.unpin_page(page_id, false);
        Ok(result)
    }

    /// Inserts a unique key. Duplicates leave the tree unchanged.
    pub fn insert(&self, key: &[u8], value: RowId) -> Result<()> {
        if self.is_empty() {
            self.start_new_tree(key, value)
        } else {
            self.insert_into_leaf(key, value)
        }
    }

    fn start_new_tree(&self, key: &[u8], value: RowId) -> Result<()> {
        let (page_id, frame) = self.buffer_pool.new_page()?;
        {
            let mut data = frame.write_data();
            LeafNode::init(
                &mut data[..],
                page_id,
                PageId::INVALID,
                self.processor.key_size(),
                self.leaf_max_size,
            );
            LeafNode::insert(&mut data[..], key, value, &self.processor);
        }
        self.set_root(page_id);
        self.update_root_on_disk()?;
        self.buffer_pool.unpin_page(page_id, true);
        Ok(())
    }

    fn insert_into_leaf(&self, key: &[u8], value: RowId) -> Result<()> {
        let (leaf_pid, leaf_frame) = self.find_leaf(Some(key), false)?;

        let (duplicate, size) = {
            let data = leaf_frame.read_data();
            (
                LeafNode::lookup(&data[..], key, &self.processor).is_some(),
                BTreeNode::size(&data[..]),
            )
        };
        if duplicate {
            self.buffer_pool.unpin_page(leaf_pid, false);
            return Err(DbError::DuplicateKey);
        }

        if size < self.leaf_max_size {
            LeafNode::insert(&mut leaf_frame.write_data()[..], key, value, &self.processor);
            self.buffer_pool.unpin_page(leaf_pid, true);
            return Ok(());
        }

        // Full leaf: split, then place the key in whichever half owns it.
        let (new_pid, new_frame) = match self.buffer_pool.new_page() {
            Ok(pair) => pair,
            Err(e) => {
                self.buffer_pool.unpin_page(leaf_pid, false);
                return Err(e);
            }
        };

        let separator = {
            let mut leaf_data = leaf_frame.write_data();
            let mut new_data = new_frame.write_data();
            LeafNode::init(
                &mut new_data[..],
                new_pid,
                BTreeNode::parent(&leaf_data[..]),
                self.processor.key_size(),
                self.leaf_max_size,
            );
            LeafNode::move_half_to(&mut leaf_data[..], &mut new_data[..]);
            LeafNode::set_next_leaf(&mut new_data[..], LeafNode::next_leaf(&leaf_data[..]));
            LeafNode::set_next_leaf(&mut leaf_data[..], new_pid);

            let lower_last = BTreeNode::size(&leaf_data[..]) - 1;
            if self.processor.compare(key, LeafNode::key_at(&leaf_data[..], lower_last))
                == Ordering::Greater
            {
                LeafNode::insert(&mut new_data[..], key, value, &self.processor);
            } else {
                LeafNode::insert(&mut leaf_data[..], key, value, &self.processor);
            }
            LeafNode::key_at(&new_data[..], 0).to_vec()
        };

        let result = self.insert_into_parent(leaf_pid, &separator, new_pid);
        self.buffer_pool.unpin_page(leaf_pid, true);
        self.buffer_pool.unpin_page(new_pid, true);
        result
    }

    /// Links a freshly split sibling into the parent, splitting parents
    /// recursively and growing a new root when the old root split.
    fn insert_into_parent(&self, old_pid: PageId, separator: &[u8], new_pid: PageId) -> Result<()> {
        let old_frame = self.buffer_pool.fetch_page(old_pid)?;
        let parent_pid = BTreeNode::parent(&old_frame.read_data()[..]);

        if !parent_pid.is_valid() {
            // The root split: grow a new root above both halves.
            let (root_pid, root_frame) = match self.buffer_pool.new_page() {
                Ok(pair) => pair,
                Err(e) => {
                    self.buffer_pool.unpin_page(old_pid, false);
                    return Err(e);
                }
            };
            {
                let mut root_data = root_frame.write_data();
                InternalNode::init(
                    &mut root_data[..],
                    root_pid,
                    PageId::INVALID,
                    self.processor.key_size(),
                    self.internal_max_size,
                );
                InternalNode::populate_new_root(&mut root_data[..], old_pid, separator, new_pid);
            }
            BTreeNode::set_parent(&mut old_frame.write_data()[..], root_pid);
            self.buffer_pool.unpin_page(old_pid, true);

            let new_frame = self.buffer_pool.fetch_page(new_pid)?;
            BTreeNode::set_parent(&mut new_frame.write_data()[..], root_pid);
            self.buffer_pool.unpin_page(new_pid, true);

            self.set_root(root_pid);
            self.update_root_on_disk()?;
            self.buffer_pool.unpin_page(root_pid, true);
            return Ok(());
        }
        self.buffer_pool.unpin_page(old_pid, false);

        let parent_frame = self.buffer_pool.fetch_page(parent_pid)?;
        let parent_size = BTreeNode::size(&parent_frame.read_data()[..]);

        if parent_size < self.internal_max_size {
            InternalNode::insert_node_after(
                &mut parent_frame.write_data()[..],
                old_pid,
                separator,
                new_pid,
            );
            self.buffer_pool.unpin_page(parent_pid, true);
            return Ok(());
        }

        // Full parent: split it and push its separator further up.
        let (split_pid, split_frame) = match self.buffer_pool.new_page() {
            Ok(pair) => pair,
            Err(e) => {
                self.buffer_pool.unpin_page(parent_pid, false);
                return Err(e);
            }
        };

        let moved = {
            let mut parent_data = parent_frame.write_data();
            let mut split_data = split_frame.write_data();
            InternalNode::init(
                &mut split_data[..],
                split_pid,
                BTreeNode::parent(&parent_data[..]),
                self.processor.key_size(),
                self.internal_max_size,
            );
            InternalNode::move_half_to(&mut parent_data[..], &mut split_data[..])
        };
        self.reparent_children(split_pid, 0, moved)?;

        // The pair goes wherever old_pid's entry landed after the move.
        let goes_right =
            InternalNode::value_index(&split_frame.read_data()[..], old_pid).is_some();
        if goes_right {
            InternalNode::insert_node_after(
                &mut split_frame.write_data()[..],
                old_pid,
                separator,
                new_pid,
            );
            let new_frame = self.buffer_pool.fetch_page(new_pid)?;
            BTreeNode::set_parent(&mut new_frame.write_data()[..], split_pid);
            self.buffer_pool.unpin_page(new_pid, true);
        } else {
            InternalNode::insert_node_after(
                &mut parent_frame.write_data()[..],
                old_pid,
                separator,
                new_pid,
            );
        }

        let promoted = InternalNode::key_at(&split_frame.read_data()[..], 0).to_vec();
        let result = self.insert_into_parent(parent_pid, &promoted, split_pid);
        self.buffer_pool.unpin_page(parent_pid, true);
        self.buffer_pool.unpin_page(split_pid, true);
        result
    }

    /// Sets the parent pointer of `count` children of `node_pid`
    /// starting at entry `from`.
    fn reparent_children(&self, node_pid: PageId, from: usize, count: usize) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(node_pid)?;
        let children: Vec<PageId> = {
            let data = frame.read_data();
            (from..from + count)
                .map(|i| InternalNode::value_at(&data[..], i))
                .collect()
        };
        self.buffer_pool.unpin_page(node_pid, false);

        for child in children {
            if child.is_valid() {
                let child_frame = self.buffer_pool.fetch_page(child)?;
                BTreeNode::set_parent(&mut child_frame.write_data()[..], node_pid);
                self.buffer_pool.unpin_page(child, true);
            }
        }
        Ok(())
    }

    /// Removes a key, rebalancing on underflow.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        if self.is_empty() {
            return Err(DbError::KeyNotFound);
        }

        let (leaf_pid, leaf_frame) = self.find_leaf(Some(key), false)?;
        let old_size = BTreeNode::size(&leaf_frame.read_data()[..]);
        let new_size = LeafNode::remove(&mut leaf_frame.write_data()[..], key, &self.processor);
        if new_size == old_size {
            self.buffer_pool.unpin_page(leaf_pid, false);
            return Err(DbError::KeyNotFound);
        }

        let (is_root, min_size) = {
            let data = leaf_frame.read_data();
            (BTreeNode::is_root(&data[..]), BTreeNode::min_size(&data[..]))
        };
        self.buffer_pool.unpin_page(leaf_pid, true);

        if is_root {
            if new_size == 0 {
                // The whole tree is gone.
                self.set_root(PageId::INVALID);
                self.update_root_on_disk()?;
                self.buffer_pool.delete_page(leaf_pid)?;
            }
            return Ok(());
        }
        if new_size < min_size {
            self.coalesce_or_redistribute(leaf_pid)?;
        }
        Ok(())
    }

    /// Restores the fill invariant of an underfull non-root node by
    /// borrowing from a sibling or merging with it.
    fn coalesce_or_redistribute(&self, node_pid: PageId) -> Result<()> {
        let node_frame = self.buffer_pool.fetch_page(node_pid)?;
        let (node_size, node_max, node_is_leaf, parent_pid) = {
            let data = node_frame.read_data();
            (
                BTreeNode::size(&data[..]),
                BTreeNode::max_size(&data[..]),
                BTreeNode::is_leaf(&data[..]),
                BTreeNode::parent(&data[..]),
            )
        };

        let parent_frame = self.buffer_pool.fetch_page(parent_pid)?;
        let (index, sibling_pid) = {
            let data = parent_frame.read_data();
            let index = InternalNode::value_index(&data[..], node_pid).ok_or_else(|| {
                DbError::PageCorrupted {
                    page_id: parent_pid.0,
                    reason: "child missing from parent".to_string(),
                }
            })?;
            // Prefer the left sibling; the leftmost child uses its right one.
            let sibling_pid = if index == 0 {
                InternalNode::value_at(&data[..], 1)
            } else {
                InternalNode::value_at(&data[..], index - 1)
            };
            (index, sibling_pid)
        };

        let sibling_frame = self.buffer_pool.fetch_page(sibling_pid)?;
        let sibling_size = BTreeNode::size(&sibling_frame.read_data()[..]);

        if sibling_size + node_size > node_max {
            self.redistribute(
                sibling_frame,
                node_frame,
                parent_frame,
                node_pid,
                index,
                node_is_leaf,
            )?;
            self.buffer_pool.unpin_page(sibling_pid, true);
            self.buffer_pool.unpin_page(node_pid, true);
            self.buffer_pool.unpin_page(parent_pid, true);
            return Ok(());
        }

        // Merge: fold everything into the left page, drop the right one.
        if index == 0 {
            // Sibling is on the right; it merges into node.
            if node_is_leaf {
                let mut node_data = node_frame.write_data();
                let mut sibling_data = sibling_frame.write_data();
                LeafNode::move_all_to(&mut sibling_data[..], &mut node_data[..]);
            } else {
                let middle = InternalNode::key_at(&parent_frame.read_data()[..], 1).to_vec();
                let (start, count) = {
                    let mut node_data = node_frame.write_data();
                    let mut sibling_data = sibling_frame.write_data();
                    let count = BTreeNode::size(&sibling_data[..]);
                    let start =
                        InternalNode::move_all_to(&mut sibling_data[..], &mut node_data[..], &middle);
                    (start, count)
                };
                self.reparent_children(node_pid, start, count)?;
            }
            InternalNode::remove(&mut parent_frame.write_data()[..], 1);
            self.buffer_pool.unpin_page(sibling_pid, false);
            self.buffer_pool.delete_page(sibling_pid)?;
            self.buffer_pool.unpin_page(node_pid, true);
        } else {
            // Sibling is on the left; node merges into it.
            if node_is_leaf {
                let mut sibling_data = sibling_frame.write_data();
                let mut node_data = node_frame.write_data();
                LeafNode::move_all_to(&mut node_data[..], &mut sibling_data[..]);
            } else {
                let middle = InternalNode::key_at(&parent_frame.read_data()[..], index).to_vec();
                let (start, count) = {
                    let mut sibling_data = sibling_frame.write_data();
                    let mut node_data = node_frame.write_data();
                    let count = BTreeNode::size(&node_data[..]);
                    let start = InternalNode::move_all_to(
                        &mut node_data[..],
                        &mut sibling_data[..],
                        &middle,
                    );
                    (start, count)
                };
                self.reparent_children(sibling_pid, start, count)?;
            }
            InternalNode::remove(&mut parent_frame.write_data()[..], index);
            self.buffer_pool.unpin_page(node_pid, false);
            self.buffer_pool.delete_page(node_pid)?;
            self.buffer_pool.unpin_page(sibling_pid, true);
        }

        let (parent_size, parent_is_root, parent_min) = {
            let data = parent_frame.read_data();
            (
                BTreeNode::size(&data[..]),
                BTreeNode::is_root(&data[..]),
                BTreeNode::min_size(&data[..]),
            )
        };
        self.buffer_pool.unpin_page(parent_pid, true);

        if parent_is_root {
            if parent_size == 1 {
                self.collapse_root(parent_pid)?;
            }
        } else if parent_size < parent_min {
            self.coalesce_or_redistribute(parent_pid)?;
        }
        Ok(())
    }

    /// Replaces a one-child internal root with that child.
    fn collapse_root(&self, root_pid: PageId) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(root_pid)?;
        let child = InternalNode::remove_and_return_only_child(&mut frame.write_data()[..]);
        self.buffer_pool.unpin_page(root_pid, false);
        self.buffer_pool.delete_page(root_pid)?;

        let child_frame = self.buffer_pool.fetch_page(child)?;
        BTreeNode::set_parent(&mut child_frame.write_data()[..], PageId::INVALID);
        self.buffer_pool.unpin_page(child, true);

        self.set_root(child);
        self.update_root_on_disk()
    }

    /// Moves one entry from the richer sibling into `node` and rotates
    /// the parent separator accordingly.
    fn redistribute(
        &self,
        sibling_frame: &Frame,
        node_frame: &Frame,
        parent_frame: &Frame,
        node_pid: PageId,
        index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        if is_leaf {
            if index == 0 {
                // Right sibling: its first entry moves to node's end.
                {
                    let mut sibling_data = sibling_frame.write_data();
                    let mut node_data = node_frame.write_data();
                    LeafNode::move_first_to_end_of(&mut sibling_data[..], &mut node_data[..]);
                }
                let separator = LeafNode::key_at(&sibling_frame.read_data()[..], 0).to_vec();
                InternalNode::set_key_at(&mut parent_frame.write_data()[..], 1, &separator);
            } else {
                // Left sibling: its last entry moves to node's front.
                {
                    let mut sibling_data = sibling_frame.write_data();
                    let mut node_data = node_frame.write_data();
                    LeafNode::move_last_to_front_of(&mut sibling_data[..], &mut node_data[..]);
                }
                let separator = LeafNode::key_at(&node_frame.read_data()[..], 0).to_vec();
                InternalNode::set_key_at(&mut parent_frame.write_data()[..], index, &separator);
            }
            return Ok(());
        }

        if index == 0 {
            // The parent separator travels down with the moved child.
            let middle = InternalNode::key_at(&parent_frame.read_data()[..], 1).to_vec();
            let moved_child = {
                let mut sibling_data = sibling_frame.write_data();
                let mut node_data = node_frame.write_data();
                let child = InternalNode::value_at(&sibling_data[..], 0);
                InternalNode::copy_last_from(&mut node_data[..], &middle, child);
                InternalNode::remove(&mut sibling_data[..], 0);
                child
            };
            let separator = InternalNode::key_at(&sibling_frame.read_data()[..], 0).to_vec();
            InternalNode::set_key_at(&mut parent_frame.write_data()[..], 1, &separator);
            self.reparent_child(moved_child, node_pid)?;
        } else {
            let middle = InternalNode::key_at(&parent_frame.read_data()[..], index).to_vec();
            let (moved_key, moved_child) = {
                let mut sibling_data = sibling_frame.write_data();
                let mut node_data = node_frame.write_data();
                let last = BTreeNode::size(&sibling_data[..]) - 1;
                let key = InternalNode::key_at(&sibling_data[..], last).to_vec();
                let child = InternalNode::value_at(&sibling_data[..], last);
                InternalNode::remove(&mut sibling_data[..], last);
                InternalNode::copy_first_from(&mut node_data[..], child);
                InternalNode::set_key_at(&mut node_data[..], 1, &middle);
                (key, child)
            };
            InternalNode::set_key_at(&mut parent_frame.write_data()[..], index, &moved_key);
            self.reparent_child(moved_child, node_pid)?;
        }
        Ok(())
    }

    fn reparent_child(&self, child: PageId, parent: PageId) -> Result<()> {
        if child.is_valid() {
            let frame = self.buffer_pool.fetch_page(child)?;
            BTreeNode::set_parent(&mut frame.write_data()[..], parent);
            self.buffer_pool.unpin_page(child, true);
        }
        Ok(())
    }

    /// Deletes every page of the tree and unregisters its root.
    pub fn destroy(&self) -> Result<()> {
        let root = self.root_page_id();
        if root.is_valid() {
            self.destroy_subtree(root)?;
        }
        self.set_root(PageId::INVALID);

        let frame = self.buffer_pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        IndexRootsPage::remove(&mut frame.write_data()[..], self.index_id);
        self.buffer_pool.unpin_page(INDEX_ROOTS_PAGE_ID, true);
        Ok(())
    }

    fn destroy_subtree(&self, page_id: PageId) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(page_id)?;
        let children: Vec<PageId> = {
            let data = frame.read_data();
            if BTreeNode::is_leaf(&data[..]) {
                Vec::new()
            } else {
                (0..BTreeNode::size(&data[..]))
                    .map(|i| InternalNode::value_at(&data[..], i))
                    .collect()
            }
        };
        self.buffer_pool.unpin_page(page_id, false);

        for child in children {
            self.destroy_subtree(child)?;
        }
        self.buffer_pool.delete_page(page_id)?;
        Ok(())
    }

    /// Returns the number of levels from root to leaf. Zero for an
    /// empty tree.
    pub fn height(&self) -> Result<usize> {
        let mut page_id = self.root_page_id();
        let mut height = 0;
        while page_id.is_valid() {
            let frame = self.buffer_pool.fetch_page(page_id)?;
            let data = frame.read_data();
            height += 1;
            let next = if BTreeNode::is_leaf(&data[..]) {
                PageId::INVALID
            } else {
                InternalNode::value_at(&data[..], 0)
            };
            drop(data);
            self.buffer_pool.unpin_page(page_id, false);
            page_id = next;
        }
        Ok(height)
    }

    /// Iterates the whole tree in key order.
    pub fn iter(&self) -> Result<IndexIterator<'_>> {
        if self.is_empty() {
            return Ok(IndexIterator {
                tree: self,
                page_id: PageId::INVALID,
                index: 0,
            });
        }
        let (page_id, _frame) = self.find_leaf(None, true)?;
        self.buffer_pool.unpin_page(page_id, false);
        Ok(IndexIterator {
            tree: self,
            page_id,
            index: 0,
        })
    }

    /// Iterates from the first key >= `key`.
    pub fn iter_from(&self, key: &[u8]) -> Result<IndexIterator<'_>> {
        if self.is_empty() {
            return Ok(IndexIterator {
                tree: self,
                page_id: PageId::INVALID,
                index: 0,
            });
        }
        let (page_id, frame) = self.find_leaf(Some(key), false)?;
        let index = LeafNode::key_index(&frame.read_data()[..], key, &self.processor);
        self.buffer_pool.unpin_page(page_id, false);
        Ok(IndexIterator {
            tree: self,
            page_id,
            index,
        })
    }
}

/// Forward iterator over the leaf chain, yielding key rows and their
/// row ids.
pub struct IndexIterator<'a> {
    tree: &'a BPlusTree,
    page_id: PageId,
    index: usize,
}

impl Iterator for IndexIterator<'_> {
    type Item = (Row, RowId);

    fn next(&mut self) -> Option<(Row, RowId)> {
        loop {
            if !self.page_id.is_valid() {
                return None;
            }
            let frame = self.tree.buffer_pool.fetch_page(self.page_id).ok()?;
            let data = frame.read_data();

            if self.index < BTreeNode::size(&data[..]) {
                let key = LeafNode::key_at(&data[..], self.index).to_vec();
                let value = LeafNode::value_at(&data[..], self.index);
                drop(data);
                self.tree.buffer_pool.unpin_page(self.page_id, false);
                self.index += 1;
                let row = self.tree.processor.deserialize_key(&key).ok()?;
                return Some((row, value));
            }

            let next = LeafNode::next_leaf(&data[..]);
            drop(data);
            self.tree.buffer_pool.unpin_page(self.page_id, false);
            self.page_id = next;
            self.index = 0;
        }
    }
}
