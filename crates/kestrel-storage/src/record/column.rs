//! Column definitions and their on-disk codec.

use bytes::{Buf, BufMut, BytesMut};
use kestrel_common::types::TypeId;
use kestrel_common::{DbError, Result};

/// Magic number guarding serialized columns.
pub const COLUMN_MAGIC: u32 = 0x434F_4C55;

/// A column definition within a table schema.
///
/// Serialized layout:
/// ```text
/// u32 COLUMN_MAGIC
/// u32 name_len
/// u8[name_len] name
/// u32 type
/// u32 length
/// u32 table_index
/// u8 nullable
/// u8 unique
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    type_id: TypeId,
    /// Value length in bytes. Fixed for INT/FLOAT, declared for CHAR(n).
    length: u32,
    /// Position of this column in its table schema.
    table_index: u32,
    nullable: bool,
    unique: bool,
}

impl Column {
    /// Creates an INT or FLOAT column. The length is implied by the type.
    pub fn new(
        name: impl Into<String>,
        type_id: TypeId,
        table_index: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        debug_assert!(
            type_id != TypeId::Char,
            "CHAR columns carry an explicit length"
        );
        Self {
            name: name.into(),
            type_id,
            length: type_id.fixed_size().unwrap_or(0) as u32,
            table_index,
            nullable,
            unique,
        }
    }

    /// Creates a CHAR(length) column.
    pub fn new_char(
        name: impl Into<String>,
        length: u32,
        table_index: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::Char,
            length,
            table_index,
            nullable,
            unique,
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the declared value length in bytes.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Returns this column's position within its table schema.
    pub fn table_index(&self) -> u32 {
        self.table_index
    }

    /// Returns true if the column accepts nulls.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns true if the column is declared unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns the serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        4 + 4 + self.name.len() + 4 + 4 + 4 + 1 + 1
    }

    /// Appends the serialized column to `buf`.
    pub fn serialize_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(COLUMN_MAGIC);
        buf.put_u32_le(self.name.len() as u32);
        buf.put_slice(self.name.as_bytes());
        buf.put_u32_le(self.type_id as u32);
        buf.put_u32_le(self.length);
        buf.put_u32_le(self.table_index);
        buf.put_u8(self.nullable as u8);
        buf.put_u8(self.unique as u8);
    }

    /// Reads a serialized column from the front of `buf`, advancing it.
    pub fn deserialize_from(buf: &mut &[u8]) -> Result<Column> {
        if buf.remaining() < 8 {
            return Err(DbError::Internal("truncated column".to_string()));
        }
        let magic = buf.get_u32_le();
        if magic != COLUMN_MAGIC {
            return Err(DbError::Internal(format!(
                "bad column magic number: {magic:#x}"
            )));
        }
        let name_len = buf.get_u32_le() as usize;
        if buf.remaining() < name_len + 14 {
            return Err(DbError::Internal("truncated column".to_string()));
        }
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
        buf.advance(name_len);
        let raw_type = buf.get_u32_le();
        let type_id = TypeId::from_u32(raw_type)
            .ok_or_else(|| DbError::Internal(format!("unknown column type: {raw_type}")))?;
        let length = buf.get_u32_le();
        let table_index = buf.get_u32_le();
        let nullable = buf.get_u8() != 0;
        let unique = buf.get_u8() != 0;

        Ok(Column {
            name,
            type_id,
            length,
            table_index,
            nullable,
            unique,
        })
    }
}
