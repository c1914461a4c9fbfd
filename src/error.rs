//! Centralized error handling for wrangle.
//!
//! Every fallible engine operation returns [`Result<T>`], whose error type is
//! [`WrangleError`]. The variants follow the two phases of a dataflow's life:
//!
//! - **Construction** (`Dataflow::apply` and the step helpers): malformed
//!   steps are rejected with [`WrangleError::InvalidStep`] and the parent
//!   dataflow stays usable.
//! - **Materialization** (`head`, `to_frame`, `get_profile`, `save`): data
//!   dependent failures such as a missing column or an ambiguous example set
//!   surface here, wrapped in [`WrangleError::Step`] so the caller can see
//!   which node and which step raised them.
//!
//! ```
//! use wrangle::error::WrangleError;
//!
//! fn explain(err: &WrangleError) -> String {
//!     match err.root() {
//!         WrangleError::ColumnNotFound { column } => format!("missing {column}"),
//!         WrangleError::InferenceAmbiguous(msg) => format!("need more examples: {msg}"),
//!         other => other.to_string(),
//!     }
//! }
//! # let _ = explain;
//! ```
//!
//! ## Context Extension Trait
//!
//! The `ResultExt` trait adds `.context()` to any `Result` whose error converts
//! into [`WrangleError`]:
//!
//! ```no_run
//! use wrangle::error::ResultExt as _;
//!
//! fn load_text() -> wrangle::error::Result<String> {
//!     std::fs::read_to_string("taxi.csv").context("Failed to read taxi data")
//! }
//! ```

use crate::record::ColumnType;
use std::fmt;

/// Main error type for wrangle operations.
#[derive(Debug)]
pub enum WrangleError {
    /// Source unreachable or unreadable, or a file could not be written
    Io(std::io::Error),

    /// A source reader could not identify the file type
    UnrecognizedFormat(String),

    /// A selector or expression references a column absent from the schema
    ColumnNotFound { column: String },

    /// Rename, derive or append produced duplicate or incompatible columns
    SchemaConflict(String),

    /// Example-driven inference found no consistent program
    InferenceAmbiguous(String),

    /// A value could not be converted and the step was asked to abort
    TypeConversionFailure {
        column: String,
        value: String,
        target: ColumnType,
    },

    /// A step was rejected while building the graph
    InvalidStep(String),

    /// Malformed input data or persisted documents
    DataProcessing(String),

    /// Configuration errors
    Config(String),

    /// Materialization error raised by a specific node of the lineage
    Step {
        node: usize,
        op: &'static str,
        source: Box<WrangleError>,
    },

    /// Generic error with context
    Other(String),
}

impl WrangleError {
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Attach the node and step name that raised this error.
    ///
    /// Errors that already carry step context are returned unchanged so the
    /// innermost (originating) step is the one reported.
    pub fn at_step(self, node: usize, op: &'static str) -> Self {
        match self {
            Self::Step { .. } => self,
            other => Self::Step {
                node,
                op,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any step context removed.
    pub fn root(&self) -> &Self {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for WrangleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::UnrecognizedFormat(msg) => write!(f, "Unrecognized format: {msg}"),
            Self::ColumnNotFound { column } => write!(f, "Column not found: '{column}'"),
            Self::SchemaConflict(msg) => write!(f, "Schema conflict: {msg}"),
            Self::InferenceAmbiguous(msg) => write!(f, "Inference ambiguous: {msg}"),
            Self::TypeConversionFailure {
                column,
                value,
                target,
            } => write!(
                f,
                "Type conversion failure: cannot convert '{value}' in column '{column}' to {target}"
            ),
            Self::InvalidStep(msg) => write!(f, "Invalid step: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Step { node, op, source } => write!(f, "Step #{node} ({op}): {source}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for WrangleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Step { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WrangleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for WrangleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for WrangleError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataProcessing(format!("JSON error: {err}"))
    }
}

impl From<csv::Error> for WrangleError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io) => Self::Io(io),
                other => Self::DataProcessing(format!("CSV error: {other:?}")),
            }
        } else {
            Self::DataProcessing(format!("CSV error: {err}"))
        }
    }
}

impl From<regex::Error> for WrangleError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidStep(format!("invalid column pattern: {err}"))
    }
}

/// Result type alias for wrangle operations.
pub type Result<T> = std::result::Result<T, WrangleError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<WrangleError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| with_message(e.into(), msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| with_message(e.into(), f()))
    }
}

// I/O errors keep their variant so callers can still match on them.
fn with_message(err: WrangleError, msg: String) -> WrangleError {
    match err {
        WrangleError::Io(io) => {
            WrangleError::Io(std::io::Error::new(io.kind(), format!("{msg}: {io}")))
        }
        other => WrangleError::Other(format!("{msg}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WrangleError::column_not_found("fare_amount");
        assert_eq!(err.to_string(), "Column not found: 'fare_amount'");
    }

    #[test]
    fn test_step_context_wraps_once() {
        let err = WrangleError::column_not_found("x")
            .at_step(3, "filter")
            .at_step(5, "keep_columns");

        assert_eq!(err.to_string(), "Step #3 (filter): Column not found: 'x'");
        assert!(matches!(err.root(), WrangleError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_result_context_keeps_io_kind() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "green.csv",
        ));

        let result: Result<()> = result.context("Failed to open source");
        match result {
            Err(WrangleError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().contains("Failed to open source"));
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
