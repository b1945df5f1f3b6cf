//! Persisted catalog of tables and indexes.
//!
//! The catalog meta page (logical page 0) maps table and index ids to
//! their metadata pages:
//! ```text
//! u32 CATALOG_MAGIC
//! u32 n_tables
//! u32 n_indexes
//! (u32 table_id, i32 page_id) x n_tables
//! (u32 index_id, i32 page_id) x n_indexes
//! ```
//! The meta page is re-serialized on every mutation so a crash leaves
//! either the old or the new catalog visible, never a torn one.

use crate::heap::TableHeap;
use crate::index::{BPlusTree, KeyManager, INDEX_ROOTS_PAGE_ID};
use crate::record::{Row, Schema};
use bytes::{Buf, BufMut, BytesMut};
use kestrel_buffer::BufferPoolManager;
use kestrel_common::page::{PageId, RowId, PAGE_SIZE};
use kestrel_common::{DbError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Logical page holding the catalog meta.
pub const CATALOG_META_PAGE_ID: PageId = PageId(0);

/// Magic number guarding the catalog meta page.
pub const CATALOG_MAGIC: u32 = 0x4341_544C;
/// Magic number guarding table metadata pages.
pub const TABLE_MAGIC: u32 = 0x5441_424C;
/// Magic number guarding index metadata pages.
pub const INDEX_MAGIC: u32 = 0x494E_4458;

/// The id-to-metadata-page maps persisted on the catalog meta page.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CatalogMeta {
    table_meta_pages: BTreeMap<u32, PageId>,
    index_meta_pages: BTreeMap<u32, PageId>,
}

impl CatalogMeta {
    fn new() -> Self {
        Self::default()
    }

    fn next_table_id(&self) -> u32 {
        self.table_meta_pages
            .keys()
            .next_back()
            .map_or(0, |id| id + 1)
    }

    fn next_index_id(&self) -> u32 {
        self.index_meta_pages
            .keys()
            .next_back()
            .map_or(0, |id| id + 1)
    }

    fn serialized_size(&self) -> usize {
        12 + 8 * (self.table_meta_pages.len() + self.index_meta_pages.len())
    }

    fn serialize_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(CATALOG_MAGIC);
        buf.put_u32_le(self.table_meta_pages.len() as u32);
        buf.put_u32_le(self.index_meta_pages.len() as u32);
        for (&id, &page_id) in &self.table_meta_pages {
            buf.put_u32_le(id);
            buf.put_i32_le(page_id.0);
        }
        for (&id, &page_id) in &self.index_meta_pages {
            buf.put_u32_le(id);
            buf.put_i32_le(page_id.0);
        }
    }

    fn deserialize_from(mut buf: &[u8]) -> Result<CatalogMeta> {
        if buf.remaining() < 12 {
            return Err(DbError::PageCorrupted {
                page_id: CATALOG_META_PAGE_ID.0,
                reason: "truncated catalog meta".to_string(),
            });
        }
        let magic = buf.get_u32_le();
        if magic != CATALOG_MAGIC {
            return Err(DbError::PageCorrupted {
                page_id: CATALOG_META_PAGE_ID.0,
                reason: format!("bad catalog magic number: {magic:#x}"),
            });
        }
        let n_tables = buf.get_u32_le() as usize;
        let n_indexes = buf.get_u32_le() as usize;

        let mut meta = CatalogMeta::new();
        for _ in 0..n_tables {
            let id = buf.get_u32_le();
            meta.table_meta_pages.insert(id, PageId(buf.get_i32_le()));
        }
        for _ in 0..n_indexes {
            let id = buf.get_u32_le();
            meta.index_meta_pages.insert(id, PageId(buf.get_i32_le()));
        }
        Ok(meta)
    }
}

/// Per-table metadata persisted on its own page.
///
/// Layout: `u32 TABLE_MAGIC, u32 table_id, u32 name_len, name bytes,
/// i32 first_page_id, schema`.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    table_id: u32,
    name: String,
    first_page_id: PageId,
    schema: Arc<Schema>,
}

impl TableMetadata {
    fn serialize_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(TABLE_MAGIC);
        buf.put_u32_le(self.table_id);
        buf.put_u32_le(self.name.len() as u32);
        buf.put_slice(self.name.as_bytes());
        buf.put_i32_le(self.first_page_id.0);
        self.schema.serialize_to(buf);
    }

    fn deserialize_from(mut buf: &[u8]) -> Result<TableMetadata> {
        let magic = buf.get_u32_le();
        if magic != TABLE_MAGIC {
            return Err(DbError::Internal(format!(
                "bad table metadata magic number: {magic:#x}"
            )));
        }
        let table_id = buf.get_u32_le();
        let name_len = buf.get_u32_le() as usize;
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        buf.advance(name_len);
        let first_page_id = PageId(buf.get_i32_le());
        let schema = Arc::new(Schema::deserialize_from(&mut buf)?);

        Ok(TableMetadata {
            table_id,
            name,
            first_page_id,
            schema,
        })
    }
}

/// A catalog entry pairing table metadata with its heap.
pub struct TableInfo {
    meta: TableMetadata,
    heap: TableHeap,
}

impl TableInfo {
    /// Returns the table id.
    pub fn table_id(&self) -> u32 {
        self.meta.table_id
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Returns the table schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.meta.schema
    }

    /// Returns the table heap.
    pub fn heap(&self) -> &TableHeap {
        &self.heap
    }
}

/// Per-index metadata persisted on its own page.
///
/// Layout: `u32 INDEX_MAGIC, u32 index_id, u32 name_len, name bytes,
/// u32 table_id, u32 key_count, u32 column_indices[key_count]`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    index_id: u32,
    name: String,
    table_id: u32,
    key_map: Vec<u32>,
}

impl IndexMetadata {
    fn serialize_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(INDEX_MAGIC);
        buf.put_u32_le(self.index_id);
        buf.put_u32_le(self.name.len() as u32);
        buf.put_slice(self.name.as_bytes());
        buf.put_u32_le(self.table_id);
        buf.put_u32_le(self.key_map.len() as u32);
        for &col in &self.key_map {
            buf.put_u32_le(col);
        }
    }

    fn deserialize_from(mut buf: &[u8]) -> Result<IndexMetadata> {
        let magic = buf.get_u32_le();
        if magic != INDEX_MAGIC {
            return Err(DbError::Internal(format!(
                "bad index metadata magic number: {magic:#x}"
            )));
        }
        let index_id = buf.get_u32_le();
        let name_len = buf.get_u32_le() as usize;
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        buf.advance(name_len);
        let table_id = buf.get_u32_le();
        let key_count = buf.get_u32_le() as usize;
        let key_map = (0..key_count).map(|_| buf.get_u32_le()).collect();

        Ok(IndexMetadata {
            index_id,
            name,
            table_id,
            key_map,
        })
    }
}

/// A catalog entry pairing index metadata with its B+ tree.
pub struct IndexInfo {
    meta: IndexMetadata,
    table_schema: Arc<Schema>,
    tree: BPlusTree,
}

impl IndexInfo {
    /// Returns the index id.
    pub fn index_id(&self) -> u32 {
        self.meta.index_id
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Returns the id of the indexed table.
    pub fn table_id(&self) -> u32 {
        self.meta.table_id
    }

    /// Returns the positions of the key columns in the table schema.
    pub fn key_map(&self) -> &[u32] {
        &self.meta.key_map
    }

    /// Returns the underlying tree.
    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    /// Indexes a heap row under its key columns.
    pub fn insert_entry(&self, row: &Row) -> Result<()> {
        let key = self.key_for(row)?;
        self.tree.insert(&key, row.row_id())
    }

    /// Removes a heap row's index entry.
    pub fn remove_entry(&self, row: &Row) -> Result<()> {
        let key = self.key_for(row)?;
        self.tree.remove(&key)
    }

    /// Looks up a heap row id by its key columns.
    pub fn lookup(&self, row: &Row) -> Result<Option<RowId>> {
        let key = self.key_for(row)?;
        self.tree.get_value(&key)
    }

    fn key_for(&self, row: &Row) -> Result<Vec<u8>> {
        let key_row = row.key_from_row(&self.table_schema, self.tree.key_manager().key_schema())?;
        self.tree.key_manager().serialize_key(&key_row)
    }
}

/// The catalog manager: name resolution, metadata persistence, and
/// lifecycle of tables and indexes.
pub struct CatalogManager {
    buffer_pool: Arc<BufferPoolManager>,
    meta: CatalogMeta,
    tables: HashMap<u32, Arc<TableInfo>>,
    table_names: HashMap<String, u32>,
    indexes: HashMap<u32, Arc<IndexInfo>>,
    /// table name -> index name -> index id
    index_names: HashMap<String, HashMap<String, u32>>,
}

impl CatalogManager {
    /// Creates a catalog on a fresh database (`init` true) or loads the
    /// persisted one (`init` false).
    ///
    /// A fresh database claims logical pages 0 and 1 for the catalog
    /// meta and the index-roots page.
    pub fn new(buffer_pool: Arc<BufferPoolManager>, init: bool) -> Result<CatalogManager> {
        let mut catalog = CatalogManager {
            buffer_pool,
            meta: CatalogMeta::new(),
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
        };

        if init {
            let (meta_pid, _) = catalog.buffer_pool.new_page()?;
            catalog.buffer_pool.unpin_page(meta_pid, true);
            let (roots_pid, _) = catalog.buffer_pool.new_page()?;
            catalog.buffer_pool.unpin_page(roots_pid, true);
            if meta_pid != CATALOG_META_PAGE_ID || roots_pid != INDEX_ROOTS_PAGE_ID {
                return Err(DbError::Internal(
                    "catalog can only be initialized on a fresh database".to_string(),
                ));
            }
            catalog.flush_meta()?;
        } else {
            let frame = catalog.buffer_pool.fetch_page(CATALOG_META_PAGE_ID)?;
            let meta = CatalogMeta::deserialize_from(&frame.read_data()[..]);
            catalog.buffer_pool.unpin_page(CATALOG_META_PAGE_ID, false);
            catalog.meta = meta?;

            for (table_id, page_id) in catalog.meta.table_meta_pages.clone() {
                catalog.load_table(table_id, page_id)?;
            }
            for (index_id, page_id) in catalog.meta.index_meta_pages.clone() {
                catalog.load_index(index_id, page_id)?;
            }
        }
        Ok(catalog)
    }

    /// Creates a table with a fresh empty heap.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<Arc<TableInfo>> {
        if self.table_names.contains_key(name) {
            return Err(DbError::TableAlreadyExists(name.to_string()));
        }

        let table_id = self.meta.next_table_id();
        let schema = Arc::new(schema);
        let heap = TableHeap::create(self.buffer_pool.clone(), schema.clone())?;
        let meta = TableMetadata {
            table_id,
            name: name.to_string(),
            first_page_id: heap.first_page_id(),
            schema,
        };

        let (meta_pid, frame) = self.buffer_pool.new_page()?;
        let mut buf = BytesMut::new();
        meta.serialize_to(&mut buf);
        if buf.len() > PAGE_SIZE {
            self.buffer_pool.unpin_page(meta_pid, false);
            self.buffer_pool.delete_page(meta_pid)?;
            return Err(DbError::Internal(format!(
                "table metadata for {name} exceeds one page"
            )));
        }
        frame.write_data()[..buf.len()].copy_from_slice(&buf);
        self.buffer_pool.unpin_page(meta_pid, true);

        let info = Arc::new(TableInfo { meta, heap });
        self.tables.insert(table_id, info.clone());
        self.table_names.insert(name.to_string(), table_id);
        self.index_names.insert(name.to_string(), HashMap::new());
        self.meta.table_meta_pages.insert(table_id, meta_pid);
        self.flush_meta()?;
        Ok(info)
    }

    /// Drops a table, its heap pages, and all its indexes.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let table_id = *self
            .table_names
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

        let index_names: Vec<String> = self
            .index_names
            .get(name)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        for index_name in index_names {
            self.drop_index(name, &index_name)?;
        }

        let info = self.tables.remove(&table_id).expect("maps in sync");
        info.heap().delete_table()?;

        self.table_names.remove(name);
        self.index_names.remove(name);
        if let Some(meta_pid) = self.meta.table_meta_pages.remove(&table_id) {
            self.buffer_pool.delete_page(meta_pid)?;
        }
        self.flush_meta()
    }

    /// Creates a B+ tree index over the named key columns.
    ///
    /// Key columns are resolved against the table schema; an unknown
    /// name fails the whole operation.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        key_columns: &[&str],
        index_type: &str,
    ) -> Result<Arc<IndexInfo>> {
        let table_indexes = self
            .index_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        if table_indexes.contains_key(index_name) {
            return Err(DbError::IndexAlreadyExists(index_name.to_string()));
        }
        if index_type != "bptree" {
            return Err(DbError::Internal(format!(
                "unsupported index type: {index_type}"
            )));
        }

        let table_id = self.table_names[table_name];
        let table_info = self.tables[&table_id].clone();

        let mut key_map = Vec::with_capacity(key_columns.len());
        for name in key_columns {
            key_map.push(table_info.schema().column_index(name)? as u32);
        }

        let index_id = self.meta.next_index_id();
        let meta = IndexMetadata {
            index_id,
            name: index_name.to_string(),
            table_id,
            key_map,
        };
        let info = self.materialize_index(&meta, &table_info)?;

        let (meta_pid, frame) = self.buffer_pool.new_page()?;
        let mut buf = BytesMut::new();
        meta.serialize_to(&mut buf);
        frame.write_data()[..buf.len()].copy_from_slice(&buf);
        self.buffer_pool.unpin_page(meta_pid, true);

        self.indexes.insert(index_id, info.clone());
        self.index_names
            .get_mut(table_name)
            .expect("checked above")
            .insert(index_name.to_string(), index_id);
        self.meta.index_meta_pages.insert(index_id, meta_pid);
        self.flush_meta()?;
        Ok(info)
    }

    /// Drops an index and destroys its tree pages.
    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> Result<()> {
        let table_indexes = self
            .index_names
            .get_mut(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        let index_id = table_indexes
            .remove(index_name)
            .ok_or_else(|| DbError::IndexNotFound(index_name.to_string()))?;

        if let Some(info) = self.indexes.remove(&index_id) {
            info.tree().destroy()?;
        }
        if let Some(meta_pid) = self.meta.index_meta_pages.remove(&index_id) {
            self.buffer_pool.delete_page(meta_pid)?;
        }
        self.flush_meta()
    }

    /// Looks a table up by name.
    pub fn get_table(&self, name: &str) -> Result<Arc<TableInfo>> {
        let table_id = self
            .table_names
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;
        Ok(self.tables[table_id].clone())
    }

    /// Looks a table up by id.
    pub fn get_table_by_id(&self, table_id: u32) -> Result<Arc<TableInfo>> {
        self.tables
            .get(&table_id)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(format!("table#{table_id}")))
    }

    /// Returns every table in the catalog.
    pub fn get_tables(&self) -> Vec<Arc<TableInfo>> {
        self.tables.values().cloned().collect()
    }

    /// Looks an index up by table and index name.
    pub fn get_index(&self, table_name: &str, index_name: &str) -> Result<Arc<IndexInfo>> {
        let table_indexes = self
            .index_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        let index_id = table_indexes
            .get(index_name)
            .ok_or_else(|| DbError::IndexNotFound(index_name.to_string()))?;
        Ok(self.indexes[index_id].clone())
    }

    /// Returns every index of a table.
    pub fn get_table_indexes(&self, table_name: &str) -> Result<Vec<Arc<IndexInfo>>> {
        let table_indexes = self
            .index_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))?;
        Ok(table_indexes
            .values()
            .map(|id| self.indexes[id].clone())
            .collect())
    }

    /// Serializes the catalog meta page and writes it through.
    pub fn flush_meta(&self) -> Result<()> {
        if self.meta.serialized_size() > PAGE_SIZE {
            return Err(DbError::Internal("catalog meta exceeds one page".to_string()));
        }
        let mut buf = BytesMut::new();
        self.meta.serialize_to(&mut buf);

        let frame = self.buffer_pool.fetch_page(CATALOG_META_PAGE_ID)?;
        frame.write_data()[..buf.len()].copy_from_slice(&buf);
        self.buffer_pool.unpin_page(CATALOG_META_PAGE_ID, true);
        self.buffer_pool.flush_page(CATALOG_META_PAGE_ID)?;
        Ok(())
    }

    fn load_table(&mut self, table_id: u32, page_id: PageId) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(page_id)?;
        let meta = TableMetadata::deserialize_from(&frame.read_data()[..]);
        self.buffer_pool.unpin_page(page_id, false);
        let meta = meta?;

        if meta.table_id != table_id {
            warn!(
                expected = table_id,
                found = meta.table_id,
                "table metadata page id mismatch"
            );
        }
        let heap = TableHeap::open(
            self.buffer_pool.clone(),
            meta.schema.clone(),
            meta.first_page_id,
        );
        self.table_names.insert(meta.name.clone(), table_id);
        self.index_names.entry(meta.name.clone()).or_default();
        self.tables.insert(table_id, Arc::new(TableInfo { meta, heap }));
        Ok(())
    }

    fn load_index(&mut self, index_id: u32, page_id: PageId) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(page_id)?;
        let meta = IndexMetadata::deserialize_from(&frame.read_data()[..]);
        self.buffer_pool.unpin_page(page_id, false);
        let meta = meta?;

        let table_info = self.get_table_by_id(meta.table_id)?;
        let info = self.materialize_index(&meta, &table_info)?;
        self.index_names
            .entry(table_info.name().to_string())
            .or_default()
            .insert(meta.name.clone(), index_id);
        self.indexes.insert(index_id, info);
        Ok(())
    }

    /// Builds the key schema and opens the tree for an index.
    fn materialize_index(
        &self,
        meta: &IndexMetadata,
        table_info: &Arc<TableInfo>,
    ) -> Result<Arc<IndexInfo>> {
        let mut key_columns = Vec::with_capacity(meta.key_map.len());
        for &col in &meta.key_map {
            let column = table_info
                .schema()
                .column(col as usize)
                .ok_or_else(|| DbError::ColumnNotFound(format!("column#{col}")))?;
            key_columns.push(column.clone());
        }
        let key_schema = Arc::new(Schema::new(key_columns));
        let key_size = KeyManager::compute_key_size(&key_schema)?;
        let tree = BPlusTree::new(
            meta.index_id,
            self.buffer_pool.clone(),
            KeyManager::new(key_schema, key_size),
            None,
            None,
        )?;

        Ok(Arc::new(IndexInfo {
            meta: meta.clone(),
            table_schema: table_info.schema().clone(),
            tree,
        }))
    }
}
