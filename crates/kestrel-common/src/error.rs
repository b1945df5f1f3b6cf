//! Error types for KestrelDB.

use thiserror::Error;

/// Result type alias using DbError.
pub type Result<T> = std::result::Result<T, DbError>;

/// Stable status codes exposed to external consumers.
///
/// These integer values are part of the engine's external contract and
/// must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    Success = 0,
    Failed = 1,
    AlreadyExist = 2,
    NotExist = 3,
    TableAlreadyExist = 4,
    TableNotExist = 5,
    IndexAlreadyExist = 6,
    IndexNotFound = 7,
    ColumnNameNotExist = 8,
    KeyNotFound = 9,
    Quit = 10,
}

/// Errors that can occur in KestrelDB operations.
#[derive(Debug, Error)]
pub enum DbError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Buffer pool errors
    #[error("Buffer pool full, all frames pinned")]
    BufferPoolFull,

    // Page errors
    #[error("Page full, unable to insert tuple")]
    PageFull,

    #[error("Page {page_id} corrupted: {reason}")]
    PageCorrupted { page_id: i32, reason: String },

    #[error("Invalid page id: {0}")]
    InvalidPageId(i32),

    // Record errors
    #[error("Tuple too large: {size} bytes (max {max})")]
    TupleTooLarge { size: usize, max: usize },

    #[error("Tuple not found at {0}")]
    TupleNotFound(String),

    // B+ tree errors
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    // Catalog errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Returns the stable status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DbError::TableNotFound(_) => StatusCode::TableNotExist,
            DbError::TableAlreadyExists(_) => StatusCode::TableAlreadyExist,
            DbError::IndexNotFound(_) => StatusCode::IndexNotFound,
            DbError::IndexAlreadyExists(_) => StatusCode::IndexAlreadyExist,
            DbError::ColumnNotFound(_) => StatusCode::ColumnNameNotExist,
            DbError::KeyNotFound => StatusCode::KeyNotFound,
            DbError::DuplicateKey => StatusCode::AlreadyExist,
            DbError::TupleNotFound(_) => StatusCode::NotExist,
            _ => StatusCode::Failed,
        }
    }
}
