//! Source readers that produce the root rows of a dataflow.
//!
//! A [`SourceSpec`] is a resolved description of where rows come from. It is
//! stored in the graph and in saved dataflows, so opening a source twice reads
//! the same file the same way.

pub mod delimited;
pub mod detect;
pub mod json_lines;

use crate::config::EngineSettings;
use crate::error::Result;
use crate::pipeline::executor::RowStream;
use crate::record::{Frame, Schema};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use detect::detect_format;

/// Format requested by the caller of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    /// Inspect signature, extension and content
    #[default]
    Auto,
    Delimited,
    JsonLines,
}

/// Resolved source description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum SourceSpec {
    Delimited {
        path: PathBuf,
        delimiter: char,
        has_header: bool,
    },
    JsonLines {
        path: PathBuf,
    },
    /// Rows held in memory; saved together with the dataflow
    Inline {
        frame: Frame,
    },
}

impl SourceSpec {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self::Delimited {
            path: path.into(),
            delimiter: ',',
            has_header: true,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Delimited { path, .. } | Self::JsonLines { path } => Some(path),
            Self::Inline { .. } => None,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Delimited {
                path, delimiter, ..
            } => format!("read delimited {} (delimiter {delimiter:?})", path.display()),
            Self::JsonLines { path } => format!("read JSON lines {}", path.display()),
            Self::Inline { frame } => format!(
                "inline frame ({} rows, {} columns)",
                frame.height(),
                frame.width()
            ),
        }
    }
}

/// Resolve a path and hint into a concrete source.
///
/// # Errors
///
/// `Io` when the file cannot be read, `UnrecognizedFormat` when auto-detection
/// finds no matching reader.
pub fn resolve(path: &Path, hint: FormatHint, settings: &EngineSettings) -> Result<SourceSpec> {
    let spec = match hint {
        FormatHint::Auto => detect_format(path, settings)?,
        FormatHint::Delimited => {
            let delimiter = detect::sniff_delimiter_in_file(path, settings)?.unwrap_or(',');
            SourceSpec::Delimited {
                path: path.to_path_buf(),
                delimiter,
                has_header: true,
            }
        }
        FormatHint::JsonLines => SourceSpec::JsonLines {
            path: path.to_path_buf(),
        },
    };
    tracing::info!("Resolved source: {}", spec.description());
    Ok(spec)
}

/// Read just enough of the source to know its schema.
///
/// # Errors
///
/// `Io` when the file cannot be read, `DataProcessing` for a malformed
/// header or JSON line.
pub fn scan_schema(spec: &SourceSpec, settings: &EngineSettings) -> Result<Schema> {
    match spec {
        SourceSpec::Delimited {
            path,
            delimiter,
            has_header,
        } => delimited::read_schema(path, *delimiter, *has_header),
        SourceSpec::JsonLines { path } => json_lines::read_schema(path, settings.json_schema_sample),
        SourceSpec::Inline { frame } => Ok(frame.schema().clone()),
    }
}

/// Open a row stream over the source using a previously scanned schema.
///
/// # Errors
///
/// `Io` when the file cannot be opened. Row-level problems are yielded
/// by the stream.
pub fn open(spec: &SourceSpec, schema: Schema) -> Result<RowStream> {
    match spec {
        SourceSpec::Delimited {
            path,
            delimiter,
            has_header,
        } => delimited::open(path, *delimiter, *has_header, schema),
        SourceSpec::JsonLines { path } => json_lines::open(path, schema),
        SourceSpec::Inline { frame } => Ok(RowStream::from_rows(schema, frame.rows().to_vec())),
    }
}
