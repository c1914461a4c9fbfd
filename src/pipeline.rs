//! Step definitions and the execution engine that runs them.
//!
//! A dataflow is a chain of [`Step`]s over a source. Steps are plain data:
//! they serialize as JSON objects tagged by `op` and are validated when they
//! are applied, long before any row is read.
//!
//! # Overview
//!
//! The step library is organized into categories:
//! - **Missing Values**: `replace_na`, `drop_nulls`, `fill_nulls`
//! - **Column Management**: `rename_columns`, `keep_columns`, `drop_columns`
//! - **Type Conversion**: `to_number`, `set_column_types`
//! - **Rows**: `filter`, `take`, plus `append_rows` across dataflows
//! - **Values**: `replace`
//! - **By Example**: `split_column_by_example`, `derive_column_by_example`
//!   and their resolved forms `split_column`, `derive_column`
//!
//! # Example: Steps as Data
//!
//! ```
//! use wrangle::expr::col;
//! use wrangle::pipeline::{Step, validate_step};
//!
//! let step = Step::Filter {
//!     predicate: col("trip_distance").gt(0),
//! };
//! validate_step(&step)?;
//!
//! let json = serde_json::to_string(&step)?;
//! assert!(json.contains("\"op\":\"filter\""));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod executor;
pub mod ops;
pub mod spec;
pub mod validation;

pub use executor::{Demand, Executor, RowStream};
pub use spec::{ConversionPolicy, NullRelationship, SchemaPolicy, Step, TypeConversion};
pub use validation::validate_step;
