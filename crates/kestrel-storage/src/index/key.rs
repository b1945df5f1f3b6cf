//! Fixed-width index keys and their comparison.

use crate::record::{Row, Schema};
use kestrel_common::{DbError, Result};
use std::cmp::Ordering;
use std::sync::Arc;

/// Largest supported key size in bytes.
pub const MAX_KEY_SIZE: usize = 256;

/// Storage tiers a key size is rounded up to.
const KEY_SIZE_TIERS: [usize; 5] = [16, 32, 64, 128, 256];

/// Serializes rows into fixed-width keys and compares stored keys.
///
/// Keys are serialized rows over the key schema, zero-padded to the
/// tier size chosen at index creation. Comparison deserializes both
/// sides and compares field by field.
#[derive(Clone)]
pub struct KeyManager {
    key_schema: Arc<Schema>,
    key_size: usize,
}

impl KeyManager {
    /// Creates a key manager for a key schema with a fixed key size.
    pub fn new(key_schema: Arc<Schema>, key_size: usize) -> Self {
        Self {
            key_schema,
            key_size,
        }
    }

    /// Picks the key size tier for a key schema.
    ///
    /// The worst-case serialized row is the field count word, the null
    /// bitmap, and every column at its declared width (CHAR values add
    /// their u32 length prefix). Keys beyond the largest tier are
    /// rejected at index creation.
    pub fn compute_key_size(key_schema: &Schema) -> Result<usize> {
        let count = key_schema.column_count();
        let mut size = 4 + count.div_ceil(32) * 4;
        for column in key_schema.columns() {
            if column.type_id() == kestrel_common::types::TypeId::Char {
                size += 4;
            }
            size += column.length() as usize;
        }

        KEY_SIZE_TIERS
            .iter()
            .copied()
            .find(|&tier| size <= tier)
            .ok_or(DbError::KeyTooLarge {
                size,
                max: MAX_KEY_SIZE,
            })
    }

    /// Returns the fixed key size in bytes.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Returns the key schema.
    pub fn key_schema(&self) -> &Arc<Schema> {
        &self.key_schema
    }

    /// Serializes a key row into a zero-padded fixed-width key.
    pub fn serialize_key(&self, row: &Row) -> Result<Vec<u8>> {
        let bytes = row.serialize(&self.key_schema)?;
        if bytes.len() > self.key_size {
            return Err(DbError::KeyTooLarge {
                size: bytes.len(),
                max: self.key_size,
            });
        }
        let mut key = vec![0u8; self.key_size];
        key[..bytes.len()].copy_from_slice(&bytes);
        Ok(key)
    }

    /// Deserializes a stored key back into its row form.
    pub fn deserialize_key(&self, key: &[u8]) -> Result<Row> {
        Row::deserialize(key, &self.key_schema)
    }

    /// Compares two stored keys field by field.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match (self.deserialize_key(a), self.deserialize_key(b)) {
            (Ok(row_a), Ok(row_b)) => {
                for (field_a, field_b) in row_a.fields().iter().zip(row_b.fields()) {
                    let ord = field_a.compare(field_b);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }
            // Undecodable keys fall back to byte order so the tree
            // invariants stay total.
            _ => a.cmp(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, Field};
    use kestrel_common::types::TypeId;

    fn int_key_manager() -> KeyManager {
        let schema = Arc::new(Schema::new(vec![Column::new(
            "k",
            TypeId::Int,
            0,
            false,
            true,
        )]));
        let size = KeyManager::compute_key_size(&schema).unwrap();
        KeyManager::new(schema, size)
    }

    #[test]
    fn test_compute_key_size_tiers() {
        // One INT column: 4 (count) + 4 (bitmap) + 4 (value) = 12 -> 16.
        let schema = Schema::new(vec![Column::new("k", TypeId::Int, 0, false, true)]);
        assert_eq!(KeyManager::compute_key_size(&schema).unwrap(), 16);

        // CHAR(20): 4 + 4 + 4 + 20 = 32 -> 32.
        let schema = Schema::new(vec![Column::new_char("k", 20, 0, false, true)]);
        assert_eq!(KeyManager::compute_key_size(&schema).unwrap(), 32);

        // CHAR(100): 4 + 4 + 4 + 100 = 112 -> 128.
        let schema = Schema::new(vec![Column::new_char("k", 100, 0, false, true)]);
        assert_eq!(KeyManager::compute_key_size(&schema).unwrap(), 128);
    }

    #[test]
    fn test_compute_key_size_rejects_oversized() {
        let schema = Schema::new(vec![Column::new_char("k", 300, 0, false, true)]);
        assert!(matches!(
            KeyManager::compute_key_size(&schema),
            Err(DbError::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn test_serialize_key_fixed_width() {
        let km = int_key_manager();
        let key = km.serialize_key(&Row::new(vec![Field::Int(42)])).unwrap();
        assert_eq!(key.len(), km.key_size());

        let row = km.deserialize_key(&key).unwrap();
        assert_eq!(row.field(0), Some(&Field::Int(42)));
    }

    #[test]
    fn test_compare_int_keys() {
        let km = int_key_manager();
        let a = km.serialize_key(&Row::new(vec![Field::Int(1)])).unwrap();
        let b = km.serialize_key(&Row::new(vec![Field::Int(2)])).unwrap();
        let b2 = km.serialize_key(&Row::new(vec![Field::Int(2)])).unwrap();

        assert_eq!(km.compare(&a, &b), Ordering::Less);
        assert_eq!(km.compare(&b, &a), Ordering::Greater);
        assert_eq!(km.compare(&b, &b2), Ordering::Equal);
    }

    #[test]
    fn test_compare_negative_ints() {
        let km = int_key_manager();
        let neg = km.serialize_key(&Row::new(vec![Field::Int(-5)])).unwrap();
        let pos = km.serialize_key(&Row::new(vec![Field::Int(3)])).unwrap();
        assert_eq!(km.compare(&neg, &pos), Ordering::Less);
    }

    #[test]
    fn test_compare_composite_keys() {
        let schema = Arc::new(Schema::new(vec![
            Column::new_char("name", 16, 0, false, false),
            Column::new("n", TypeId::Int, 1, false, false),
        ]));
        let size = KeyManager::compute_key_size(&schema).unwrap();
        let km = KeyManager::new(schema, size);

        let make = |name: &str, n: i32| {
            km.serialize_key(&Row::new(vec![
                Field::Char(name.to_string()),
                Field::Int(n),
            ]))
            .unwrap()
        };

        assert_eq!(km.compare(&make("a", 9), &make("b", 0)), Ordering::Less);
        assert_eq!(km.compare(&make("a", 1), &make("a", 2)), Ordering::Less);
        assert_eq!(km.compare(&make("a", 2), &make("a", 2)), Ordering::Equal);
    }
}
