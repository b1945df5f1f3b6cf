//! Field values and their on-disk codec.

use bytes::{Buf, BufMut, BytesMut};
use kestrel_common::types::TypeId;
use kestrel_common::{DbError, Result};
use std::cmp::Ordering;

/// A single column value within a row.
///
/// Serialized values are not self-describing: the schema supplies the
/// type during deserialization, and null fields occupy no bytes at all
/// (the row's null bitmap records them). CHAR values carry a u32 length
/// prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i32),
    Float(f32),
    Char(String),
    /// A null value of the given declared type.
    Null(TypeId),
}

impl Field {
    /// Returns the declared type of this field.
    pub fn type_id(&self) -> TypeId {
        match self {
            Field::Int(_) => TypeId::Int,
            Field::Float(_) => TypeId::Float,
            Field::Char(_) => TypeId::Char,
            Field::Null(type_id) => *type_id,
        }
    }

    /// Returns true if this field is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null(_))
    }

    /// Returns the serialized size in bytes. Null fields occupy no bytes.
    pub fn serialized_size(&self) -> usize {
        match self {
            Field::Int(_) | Field::Float(_) => 4,
            Field::Char(s) => 4 + s.len(),
            Field::Null(_) => 0,
        }
    }

    /// Appends the serialized value to `buf`. Null fields write nothing.
    pub fn serialize_to(&self, buf: &mut BytesMut) {
        match self {
            Field::Int(v) => buf.put_i32_le(*v),
            Field::Float(v) => buf.put_f32_le(*v),
            Field::Char(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Field::Null(_) => {}
        }
    }

    /// Reads a value of type `type_id` from the front of `buf`.
    pub fn deserialize_from(buf: &mut &[u8], type_id: TypeId) -> Result<Field> {
        match type_id {
            TypeId::Int => {
                if buf.remaining() < 4 {
                    return Err(DbError::Internal("truncated INT field".to_string()));
                }
                Ok(Field::Int(buf.get_i32_le()))
            }
            TypeId::Float => {
                if buf.remaining() < 4 {
                    return Err(DbError::Internal("truncated FLOAT field".to_string()));
                }
                Ok(Field::Float(buf.get_f32_le()))
            }
            TypeId::Char => {
                if buf.remaining() < 4 {
                    return Err(DbError::Internal("truncated CHAR field".to_string()));
                }
                let len = buf.get_u32_le() as usize;
                if buf.remaining() < len {
                    return Err(DbError::Internal("truncated CHAR field".to_string()));
                }
                let value = String::from_utf8_lossy(&buf[..len]).into_owned();
                buf.advance(len);
                Ok(Field::Char(value))
            }
        }
    }

    /// Total order over fields of the same type.
    ///
    /// Nulls sort before every non-null value; two nulls compare equal.
    pub fn compare(&self, other: &Field) -> Ordering {
        match (self, other) {
            (Field::Null(_), Field::Null(_)) => Ordering::Equal,
            (Field::Null(_), _) => Ordering::Less,
            (_, Field::Null(_)) => Ordering::Greater,
            (Field::Int(a), Field::Int(b)) => a.cmp(b),
            (Field::Float(a), Field::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Field::Char(a), Field::Char(b)) => a.cmp(b),
            // Mismatched types never occur for fields of one schema.
            _ => Ordering::Equal,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Float(v) => write!(f, "{}", v),
            Field::Char(s) => write!(f, "{}", s),
            Field::Null(_) => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(field: Field) -> Field {
        let mut buf = BytesMut::new();
        field.serialize_to(&mut buf);
        assert_eq!(buf.len(), field.serialized_size());
        let mut slice = &buf[..];
        Field::deserialize_from(&mut slice, field.type_id()).unwrap()
    }

    #[test]
    fn test_int_roundtrip() {
        assert_eq!(roundtrip(Field::Int(42)), Field::Int(42));
        assert_eq!(roundtrip(Field::Int(-1)), Field::Int(-1));
        assert_eq!(roundtrip(Field::Int(i32::MIN)), Field::Int(i32::MIN));
    }

    #[test]
    fn test_float_roundtrip() {
        assert_eq!(roundtrip(Field::Float(3.25)), Field::Float(3.25));
        assert_eq!(roundtrip(Field::Float(-0.5)), Field::Float(-0.5));
    }

    #[test]
    fn test_char_roundtrip() {
        assert_eq!(
            roundtrip(Field::Char("hello".to_string())),
            Field::Char("hello".to_string())
        );
        assert_eq!(
            roundtrip(Field::Char(String::new())),
            Field::Char(String::new())
        );
    }

    #[test]
    fn test_null_serializes_to_nothing() {
        let field = Field::Null(TypeId::Int);
        assert!(field.is_null());
        assert_eq!(field.serialized_size(), 0);

        let mut buf = BytesMut::new();
        field.serialize_to(&mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_field() {
        let mut slice: &[u8] = &[1, 2];
        assert!(Field::deserialize_from(&mut slice, TypeId::Int).is_err());

        let mut slice: &[u8] = &[10, 0, 0, 0, b'a'];
        assert!(Field::deserialize_from(&mut slice, TypeId::Char).is_err());
    }

    #[test]
    fn test_compare_ints() {
        assert_eq!(Field::Int(1).compare(&Field::Int(2)), Ordering::Less);
        assert_eq!(Field::Int(2).compare(&Field::Int(2)), Ordering::Equal);
        assert_eq!(Field::Int(3).compare(&Field::Int(2)), Ordering::Greater);
    }

    #[test]
    fn test_compare_chars() {
        let a = Field::Char("abc".to_string());
        let b = Field::Char("abd".to_string());
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_compare_nulls_first() {
        let null = Field::Null(TypeId::Int);
        assert_eq!(null.compare(&Field::Int(i32::MIN)), Ordering::Less);
        assert_eq!(Field::Int(0).compare(&null), Ordering::Greater);
        assert_eq!(null.compare(&Field::Null(TypeId::Int)), Ordering::Equal);
    }

    #[test]
    fn test_display() {
        assert_eq!(Field::Int(7).to_string(), "7");
        assert_eq!(Field::Char("x".to_string()).to_string(), "x");
        assert_eq!(Field::Null(TypeId::Float).to_string(), "NULL");
    }
}
