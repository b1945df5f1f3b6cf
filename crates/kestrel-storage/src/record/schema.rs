//! Table schemas and their on-disk codec.

use crate::record::Column;
use bytes::{Buf, BufMut, BytesMut};
use kestrel_common::{DbError, Result};

/// Magic number guarding serialized schemas.
pub const SCHEMA_MAGIC: u32 = 0x5343_4845;

/// An ordered list of column definitions.
///
/// Serialized layout:
/// ```text
/// u32 SCHEMA_MAGIC
/// u32 column_count
/// columns...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema from a column list.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Returns the columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column at `index`.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Resolves a column name to its position. Names are case-sensitive.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| DbError::ColumnNotFound(name.to_string()))
    }

    /// Returns the serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        8 + self
            .columns
            .iter()
            .map(Column::serialized_size)
            .sum::<usize>()
    }

    /// Appends the serialized schema to `buf`.
    pub fn serialize_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(SCHEMA_MAGIC);
        buf.put_u32_le(self.columns.len() as u32);
        for column in &self.columns {
            column.serialize_to(buf);
        }
    }

    /// Reads a serialized schema from the front of `buf`, advancing it.
    pub fn deserialize_from(buf: &mut &[u8]) -> Result<Schema> {
        if buf.remaining() < 8 {
            return Err(DbError::Internal("truncated schema".to_string()));
        }
        let magic = buf.get_u32_le();
        if magic != SCHEMA_MAGIC {
            return Err(DbError::Internal(format!(
                "bad schema magic number: {magic:#x}"
            )));
        }
        let count = buf.get_u32_le() as usize;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            columns.push(Column::deserialize_from(buf)?);
        }
        Ok(Schema { columns })
    }
}
