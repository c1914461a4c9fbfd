//! # Wrangle - Lazy Dataflows for Tabular Data Preparation
//!
//! Wrangle is a Rust library for cleaning, merging and feature-engineering
//! tabular data. Transformations are recorded as an immutable graph of steps
//! and only executed when rows are actually requested.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wrangle::dataflow::Engine;
//! use wrangle::expr::{all_of, col};
//!
//! # fn example() -> wrangle::error::Result<()> {
//! let engine = Engine::new();
//! let trips = engine.read_csv("green_tripdata.csv")?;
//!
//! let short_trips = trips
//!     .replace_na(["distance"])?
//!     .to_number(["distance"])?
//!     .filter(all_of([col("distance").gt(0), col("distance").lt(5)]))?;
//!
//! // Nothing has been read so far
//! println!("{}", short_trips.head(5)?.to_csv_string()?);
//! println!("{}", short_trips.get_profile()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`dataflow`]: the [`Engine`] arena and [`Dataflow`] handles, save/load
//! - [`pipeline`]: step definitions, validation and the pull-based executor
//! - [`inference`]: example-driven split and derive program synthesis
//! - [`type_inference`]: learn-then-apply column type inference
//! - [`profiling`]: per-column statistics
//! - [`source`]: delimited and JSON-lines readers with format detection
//! - [`record`], [`selector`], [`expr`]: values, schemas, column selectors
//!   and predicate expressions
//! - [`config`], [`logging`], [`error`]: settings, tracing setup, errors
//!
//! ## Key Concepts
//!
//! ### Lazy Evaluation
//!
//! Applying a step only records it. `head`, `to_frame`, `get_profile` and
//! `save` walk the lineage and pull rows from the sources; `head(n)` stops as
//! soon as `n` rows have come out of the last step.
//!
//! ### Immutability
//!
//! A dataflow never changes. Every step returns a new dataflow whose lineage
//! points at its parent, so intermediate results can be reused freely:
//!
//! ```
//! use wrangle::dataflow::Engine;
//! use wrangle::record::Frame;
//!
//! # fn main() -> wrangle::error::Result<()> {
//! let engine = Engine::new();
//! let raw = engine.from_frame(Frame::from_text_rows(&["a"], &[&["1"], &["2"]])?);
//! let first = raw.take(1)?;
//!
//! assert_eq!(first.row_count()?, 1);
//! assert_eq!(raw.row_count()?, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Error Handling
//!
//! All fallible operations return [`error::Result`]. Construction errors
//! come back from the call that applied the step; data errors come back from
//! the call that materialized the dataflow, tagged with the failing step.

pub mod config;
pub mod dataflow;
pub mod error;
pub mod expr;
pub mod inference;
pub mod logging;
pub mod pipeline;
pub mod profiling;
pub mod record;
pub mod selector;
pub mod source;
pub mod type_inference;

pub use config::EngineSettings;
pub use dataflow::{Dataflow, Engine};
pub use error::{Result, WrangleError};
pub use record::{ColumnType, Frame, Schema, Value};
