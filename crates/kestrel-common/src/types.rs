//! Column type identifiers and transaction ids for KestrelDB.

use serde::{Deserialize, Serialize};

/// Identifier for the supported column data types.
///
/// Type IDs are stored in serialized columns and used when
/// deserializing row fields, so their values are part of the
/// on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TypeId {
    /// 32-bit signed integer.
    Int = 0,
    /// 32-bit IEEE-754 float.
    Float = 1,
    /// Fixed-length character string.
    Char = 2,
}

impl TypeId {
    /// Returns the fixed byte size of values of this type, or None for
    /// CHAR columns whose length comes from the column definition.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            TypeId::Int => Some(4),
            TypeId::Float => Some(4),
            TypeId::Char => None,
        }
    }

    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeId::Int | TypeId::Float)
    }

    /// Decodes a type id from its on-disk representation.
    pub fn from_u32(value: u32) -> Option<TypeId> {
        match value {
            0 => Some(TypeId::Int),
            1 => Some(TypeId::Float),
            2 => Some(TypeId::Char),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeId::Int => "INT",
            TypeId::Float => "FLOAT",
            TypeId::Char => "CHAR",
        };
        write!(f, "{}", name)
    }
}

/// Transaction identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxnId(pub i32);

impl TxnId {
    /// Invalid transaction ID.
    pub const INVALID: TxnId = TxnId(-1);

    /// Returns true if this is a valid transaction ID.
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}
