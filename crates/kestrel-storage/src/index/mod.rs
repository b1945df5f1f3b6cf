//! Disk-resident B+ tree index.

mod key;
mod node;
mod roots;
mod tree;

pub use key::{KeyManager, MAX_KEY_SIZE};
pub use node::{InternalNode, LeafNode, BTreeNode};
pub use roots::{IndexRootsPage, INDEX_ROOTS_PAGE_ID};
pub use tree::{BPlusTree, IndexIterator};
