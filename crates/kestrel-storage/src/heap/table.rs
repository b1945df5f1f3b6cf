//! Table heap: a linked list of slotted pages holding one table's rows.

use crate::heap::page::{TablePage, UpdateResult, SIZE_MAX_ROW};
use crate::record::{Row, Schema};
use kestrel_buffer::BufferPoolManager;
use kestrel_common::page::{PageId, RowId};
use kestrel_common::{DbError, Result};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Heap of tuples stored as a singly-linked chain of table pages.
///
/// Inserts start from a last-visited hint page and walk the chain,
/// appending a freshly allocated page when every page on the way is
/// full. Deletion is two-phase so a transaction abort can restore a
/// tuple that was only marked.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    schema: Arc<Schema>,
    first_page_id: PageId,
    /// Insert start hint; INVALID falls back to the first page.
    last_visited_page_id: AtomicI32,
}

impl TableHeap {
    /// Creates an empty heap with a fresh first page.
    pub fn create(buffer_pool: Arc<BufferPoolManager>, schema: Arc<Schema>) -> Result<TableHeap> {
        let (first_page_id, frame) = buffer_pool.new_page()?;
        TablePage::init(&mut frame.write_data()[..], first_page_id, PageId::INVALID);
        buffer_pool.unpin_page(first_page_id, true);

        Ok(TableHeap {
            buffer_pool,
            schema,
            first_page_id,
            last_visited_page_id: AtomicI32::new(PageId::INVALID.0),
        })
    }

    /// Opens an existing heap rooted at `first_page_id`.
    pub fn open(
        buffer_pool: Arc<BufferPoolManager>,
        schema: Arc<Schema>,
        first_page_id: PageId,
    ) -> TableHeap {
        TableHeap {
            buffer_pool,
            schema,
            first_page_id,
            last_visited_page_id: AtomicI32::new(PageId::INVALID.0),
        }
    }

    /// Returns the first page of the heap chain.
    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Returns the table schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Inserts a row, assigning its row id.
    ///
    /// Walks the chain from the hint page until some page accepts the
    /// tuple, linking a new page at the tail if none does.
    pub fn insert_tuple(&self, row: &mut Row) -> Result<()> {
        let tuple = row.serialize(&self.schema)?;
        if tuple.len() >= SIZE_MAX_ROW {
            return Err(DbError::TupleTooLarge {
                size: tuple.len(),
                max: SIZE_MAX_ROW,
            });
        }

        let hint = PageId(self.last_visited_page_id.load(Ordering::Relaxed));
        let mut page_id = if hint.is_valid() {
            hint
        } else {
            self.first_page_id
        };

        loop {
            let frame = self.buffer_pool.fetch_page(page_id)?;
            let inserted = TablePage::insert_tuple(&mut frame.write_data()[..], &tuple);

            match inserted {
                Ok(slot) => {
                    self.buffer_pool.unpin_page(page_id, true);
                    self.last_visited_page_id.store(page_id.0, Ordering::Relaxed);
                    row.set_row_id(RowId::new(page_id, slot));
                    return Ok(());
                }
                Err(DbError::PageFull) => {
                    let next = TablePage::next_page_id(&frame.read_data()[..]);
                    if next.is_valid() {
                        self.buffer_pool.unpin_page(page_id, false);
                        page_id = next;
                        continue;
                    }

                    // Tail reached: allocate and link a fresh page.
                    let (new_page_id, new_frame) = match self.buffer_pool.new_page() {
                        Ok(pair) => pair,
                        Err(e) => {
                            self.buffer_pool.unpin_page(page_id, false);
                            return Err(e);
                        }
                    };
                    TablePage::init(&mut new_frame.write_data()[..], new_page_id, page_id);
                    TablePage::set_next_page_id(&mut frame.write_data()[..], new_page_id);
                    self.buffer_pool.unpin_page(page_id, true);

                    let slot = TablePage::insert_tuple(&mut new_frame.write_data()[..], &tuple)?;
                    self.buffer_pool.unpin_page(new_page_id, true);
                    self.last_visited_page_id.store(new_page_id.0, Ordering::Relaxed);
                    row.set_row_id(RowId::new(new_page_id, slot));
                    return Ok(());
                }
                Err(e) => {
                    self.buffer_pool.unpin_page(page_id, false);
                    return Err(e);
                }
            }
        }
    }

    /// Resolves a row by its id.
    pub fn get_tuple(&self, row_id: RowId) -> Result<Row> {
        if !row_id.is_valid() {
            return Err(DbError::TupleNotFound(row_id.to_string()));
        }
        let frame = self.buffer_pool.fetch_page(row_id.page_id)?;
        let data = frame.read_data();
        let result = match TablePage::get_tuple(&data[..], row_id.slot) {
            Some(tuple) => Row::deserialize(tuple, &self.schema).map(|mut row| {
                row.set_row_id(row_id);
                row
            }),
            None => Err(DbError::TupleNotFound(row_id.to_string())),
        };
        drop(data);
        self.buffer_pool.unpin_page(row_id.page_id, false);
        result
    }

    /// Updates the row at `row_id` in place, falling back to
    /// insert-elsewhere plus tombstone when the page cannot hold the
    /// new image.
    pub fn update_tuple(&self, row: &mut Row, row_id: RowId) -> Result<()> {
        let tuple = row.serialize(&self.schema)?;

        let frame = self.buffer_pool.fetch_page(row_id.page_id)?;
        let result = TablePage::update_tuple(&mut frame.write_data()[..], row_id.slot, &tuple);

        match result {
            UpdateResult::Updated => {
                self.buffer_pool.unpin_page(row_id.page_id, true);
                row.set_row_id(row_id);
                Ok(())
            }
            UpdateResult::NotEnoughSpace => {
                self.buffer_pool.unpin_page(row_id.page_id, false);
                self.insert_tuple(row)?;
                self.mark_delete(row_id)
            }
            UpdateResult::SlotInvalid | UpdateResult::AlreadyDeleted => {
                self.buffer_pool.unpin_page(row_id.page_id, false);
                Err(DbError::TupleNotFound(row_id.to_string()))
            }
        }
    }

    /// Flags a tuple as deleted; reversible with rollback_delete.
    pub fn mark_delete(&self, row_id: RowId) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(row_id.page_id)?;
        let result = TablePage::mark_delete(&mut frame.write_data()[..], row_id.slot);
        self.buffer_pool.unpin_page(row_id.page_id, result.is_ok());
        result
    }

    /// Restores a tuple flagged by mark_delete.
    pub fn rollback_delete(&self, row_id: RowId) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(row_id.page_id)?;
        let result = TablePage::rollback_delete(&mut frame.write_data()[..], row_id.slot);
        self.buffer_pool.unpin_page(row_id.page_id, result.is_ok());
        result
    }

    /// Reclaims a tuple's storage for good.
    pub fn apply_delete(&self, row_id: RowId) -> Result<()> {
        let frame = self.buffer_pool.fetch_page(row_id.page_id)?;
        let result = TablePage::apply_delete(&mut frame.write_data()[..], row_id.slot);
        self.buffer_pool.unpin_page(row_id.page_id, result.is_ok());
        self.last_visited_page_id
            .store(PageId::INVALID.0, Ordering::Relaxed);
        result
    }

    /// Deletes every page of the heap chain.
    pub fn delete_table(&self) -> Result<()> {
        let mut page_id = self.first_page_id;
        while page_id.is_valid() {
            let frame = self.buffer_pool.fetch_page(page_id)?;
            let next = TablePage::next_page_id(&frame.read_data()[..]);
            self.buffer_pool.unpin_page(page_id, false);
            self.buffer_pool.delete_page(page_id)?;
            page_id = next;
        }
        Ok(())
    }

    /// Returns the row id of the first live tuple, walking the chain.
    fn first_row_id(&self) -> Result<RowId> {
        let mut page_id = self.first_page_id;
        while page_id.is_valid() {
            let frame = self.buffer_pool.fetch_page(page_id)?;
            let data = frame.read_data();
            let slot = TablePage::first_tuple_slot(&data[..]);
            let next = TablePage::next_page_id(&data[..]);
            drop(data);
            self.buffer_pool.unpin_page(page_id, false);

            if let Some(slot) = slot {
                return Ok(RowId::new(page_id, slot));
            }
            page_id = next;
        }
        Ok(RowId::INVALID)
    }

    /// Returns the row id following `row_id` in scan order.
    fn next_row_id(&self, row_id: RowId) -> Result<RowId> {
        let frame = self.buffer_pool.fetch_page(row_id.page_id)?;
        let data = frame.read_data();
        if let Some(slot) = TablePage::next_tuple_slot(&data[..], row_id.slot) {
            drop(data);
            self.buffer_pool.unpin_page(row_id.page_id, false);
            return Ok(RowId::new(row_id.page_id, slot));
        }
        let mut page_id = TablePage::next_page_id(&data[..]);
        drop(data);
        self.buffer_pool.unpin_page(row_id.page_id, false);

        while page_id.is_valid() {
            let frame = self.buffer_pool.fetch_page(page_id)?;
            let data = frame.read_data();
            let slot = TablePage::first_tuple_slot(&data[..]);
            let next = TablePage::next_page_id(&data[..]);
            drop(data);
            self.buffer_pool.unpin_page(page_id, false);

            if let Some(slot) = slot {
                return Ok(RowId::new(page_id, slot));
            }
            page_id = next;
        }
        Ok(RowId::INVALID)
    }

    /// Returns a forward iterator over the live rows of the heap.
    pub fn iter(&self) -> TableIterator<'_> {
        let next = self.first_row_id().unwrap_or(RowId::INVALID);
        TableIterator { heap: self, next }
    }
}

/// Forward iterator over a table heap.
///
/// Restartable from `TableHeap::iter`; each step latches the current
/// page read-only just long enough to resolve the row and find its
/// successor.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    next: RowId,
}

impl TableIterator<'_> {
    /// Returns the row id the iterator will yield next.
    pub fn peek_row_id(&self) -> RowId {
        self.next
    }
}

impl Iterator for TableIterator<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if !self.next.is_valid() {
            return None;
        }
        let row = self.heap.get_tuple(self.next).ok()?;
        self.next = self.heap.next_row_id(self.next).unwrap_or(RowId::INVALID);
        Some(row)
    }
}
