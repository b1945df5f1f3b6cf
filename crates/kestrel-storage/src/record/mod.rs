//! Record layer: columns, schemas, fields, and rows.

mod column;
mod field;
mod row;
mod schema;

pub use column::{Column, COLUMN_MAGIC};
pub use field::Field;
pub use row::Row;
pub use schema::{Schema, SCHEMA_MAGIC};
