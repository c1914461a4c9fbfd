//! Untyped row/column tabular representation with nullable cells.
//!
//! - [`Value`]: a nullable scalar cell
//! - [`ColumnType`]: declared column type, `Unknown` until inferred or converted
//! - [`Schema`]: ordered, uniquely named fields
//! - [`Frame`]: a materialized block of rows sharing one schema

pub mod frame;
pub mod schema;
pub mod value;

pub use frame::{Frame, Row};
pub use schema::{Field, Schema};
pub use value::{ColumnType, DateFormats, Value};
