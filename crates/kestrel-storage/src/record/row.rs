//! Rows and their on-disk codec.

use crate::record::{Field, Schema};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use kestrel_common::page::RowId;
use kestrel_common::{DbError, Result};

/// An ordered list of fields plus the row's storage identity.
///
/// Serialized layout:
/// ```text
/// u32 field_count
/// u32 null_bitmap[ceil(field_count / 32)]
/// non-null fields, packed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    row_id: RowId,
    fields: Vec<Field>,
}

impl Row {
    /// Creates a row from field values. The row id is assigned on insert.
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            row_id: RowId::INVALID,
            fields,
        }
    }

    /// Creates an empty row addressing `row_id`, to be filled by a fetch.
    pub fn with_row_id(row_id: RowId) -> Self {
        Self {
            row_id,
            fields: Vec::new(),
        }
    }

    /// Returns the row id.
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    /// Sets the row id.
    pub fn set_row_id(&mut self, row_id: RowId) {
        self.row_id = row_id;
    }

    /// Returns the fields in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the field at `index`.
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Returns the number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns the serialized size in bytes.
    pub fn serialized_size(&self, schema: &Schema) -> usize {
        debug_assert_eq!(self.fields.len(), schema.column_count());
        let bitmap_words = self.fields.len().div_ceil(32);
        4 + bitmap_words * 4
            + self
                .fields
                .iter()
                .map(Field::serialized_size)
                .sum::<usize>()
    }

    /// Serializes the row against its schema.
    pub fn serialize(&self, schema: &Schema) -> Result<Bytes> {
        if self.fields.len() != schema.column_count() {
            return Err(DbError::Internal(format!(
                "row has {} fields, schema has {} columns",
                self.fields.len(),
                schema.column_count()
            )));
        }

        let count = self.fields.len();
        let bitmap_words = count.div_ceil(32);
        let mut nulls = vec![0u32; bitmap_words];
        for (i, field) in self.fields.iter().enumerate() {
            if field.is_null() {
                nulls[i / 32] |= 1 << (i % 32);
            }
        }

        let mut buf = BytesMut::with_capacity(self.serialized_size(schema));
        buf.put_u32_le(count as u32);
        for word in nulls {
            buf.put_u32_le(word);
        }
        for field in &self.fields {
            field.serialize_to(&mut buf);
        }
        Ok(buf.freeze())
    }

    /// Deserializes a row against `schema`, preserving this row's id.
    pub fn deserialize(buf: &[u8], schema: &Schema) -> Result<Row> {
        let mut slice = buf;
        if slice.remaining() < 4 {
            return Err(DbError::Internal("truncated row".to_string()));
        }
        let count = slice.get_u32_le() as usize;
        if count != schema.column_count() {
            return Err(DbError::Internal(format!(
                "row has {} fields, schema has {} columns",
                count,
                schema.column_count()
            )));
        }

        let bitmap_words = count.div_ceil(32);
        if slice.remaining() < bitmap_words * 4 {
            return Err(DbError::Internal("truncated row".to_string()));
        }
        let mut nulls = Vec::with_capacity(bitmap_words);
        for _ in 0..bitmap_words {
            nulls.push(slice.get_u32_le());
        }

        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let type_id = schema.column(i).expect("count checked above").type_id();
            if nulls[i / 32] & (1 << (i % 32)) != 0 {
                fields.push(Field::Null(type_id));
            } else {
                fields.push(Field::deserialize_from(&mut slice, type_id)?);
            }
        }
        Ok(Row::new(fields))
    }

    /// Projects the index key fields out of this heap row.
    ///
    /// Key columns are resolved by name against the table schema; the
    /// resulting key row carries this row's id.
    pub fn key_from_row(&self, schema: &Schema, key_schema: &Schema) -> Result<Row> {
        let mut fields = Vec::with_capacity(key_schema.column_count());
        for column in key_schema.columns() {
            let index = schema.column_index(column.name())?;
            let field = self
                .fields
                .get(index)
                .ok_or_else(|| DbError::Internal("row narrower than schema".to_string()))?;
            fields.push(field.clone());
        }
        let mut key_row = Row::new(fields);
        key_row.set_row_id(self.row_id);
        Ok(key_row)
    }
}
