//! Storage engine for KestrelDB.
//!
//! This crate provides:
//! - Disk manager with bitmap-extent page allocation
//! - Record layer: columns, schemas, fields, and rows
//! - Slotted table pages and the table heap with its iterator
//! - Disk-resident B+ tree index
//! - Persisted catalog of tables and indexes

mod bitmap;
mod catalog;
mod disk;
mod heap;
mod index;
mod record;

pub use bitmap::{BitmapPage, DiskMetaPage, BITMAP_CAPACITY, MAX_EXTENTS};
pub use catalog::{
    CatalogManager, CatalogMeta, IndexInfo, IndexMetadata, TableInfo, TableMetadata,
    CATALOG_MAGIC, CATALOG_META_PAGE_ID, INDEX_MAGIC, TABLE_MAGIC,
};
pub use disk::{DiskManager, DiskManagerConfig};
pub use heap::{TableHeap, TableIterator, TablePage, UpdateResult, SIZE_MAX_ROW};
pub use index::{
    BPlusTree, BTreeNode, IndexIterator, IndexRootsPage, InternalNode, KeyManager, LeafNode,
    INDEX_ROOTS_PAGE_ID, MAX_KEY_SIZE,
};
pub use record::{Column, Field, Row, Schema, COLUMN_MAGIC, SCHEMA_MAGIC};
