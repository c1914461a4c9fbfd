//! Step data structures.
//!
//! A [`Step`] is the declarative, immutable description of one
//! transformation. Steps serialize as JSON objects tagged by `op`, which is the
//! form they take inside saved dataflows.

use crate::expr::Expr;
use crate::inference::{DeriveExample, DeriveProgram, SplitExample, SplitProgram};
use crate::record::{ColumnType, Value};
use crate::selector::ColumnSelector;
use serde::{Deserialize, Serialize};

/// Which selected columns must be null for `drop_nulls` to drop a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NullRelationship {
    /// Drop when any selected column is null
    #[default]
    Any,

    /// Drop only when every selected column is null
    All,
}

/// What a type conversion does with a value that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversionPolicy {
    /// Replace the value with null
    #[default]
    Null,

    /// Abort materialization with `TypeConversionFailure`
    Fail,
}

/// How `append_rows` reconciles parents whose schemas differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPolicy {
    /// Union of all columns; absent cells become null
    #[default]
    Pad,

    /// Every parent must have the same columns and types
    Reject,
}

/// Target type for one column of `set_column_types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConversion {
    pub column: String,
    pub target: ColumnType,

    /// chrono pattern for date and datetime targets; the engine's
    /// configured formats are tried when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl TypeConversion {
    pub fn new(column: impl Into<String>, target: ColumnType) -> Self {
        Self {
            column: column.into(),
            target,
            format: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Transformation step (tagged enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Turn null-like text tokens into real nulls
    ReplaceNa {
        columns: ColumnSelector,
        /// Tokens to treat as null; the engine's `null_tokens` when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<Vec<String>>,
    },

    /// Drop rows with nulls in the selected columns
    DropNulls {
        columns: ColumnSelector,
        #[serde(default)]
        relationship: NullRelationship,
    },

    /// Rename columns; for a repeated source name the later pair wins
    RenameColumns { pairs: Vec<(String, String)> },

    /// Keep only the selected columns, in their original order
    KeepColumns { columns: ColumnSelector },

    /// Remove the selected columns
    DropColumns { columns: ColumnSelector },

    /// Replace cells whose text equals `find` with `replace_with`
    Replace {
        columns: ColumnSelector,
        find: Value,
        replace_with: Value,
    },

    /// Substitute a literal for null cells
    FillNulls {
        columns: ColumnSelector,
        value: Value,
    },

    /// Parse cells as decimals; unparseable cells become null
    ToNumber { columns: ColumnSelector },

    /// Convert columns to explicit types
    SetColumnTypes {
        conversions: Vec<TypeConversion>,
        #[serde(default)]
        on_error: ConversionPolicy,
    },

    /// Keep rows where the predicate is true
    Filter { predicate: Expr },

    /// Keep the first `count` rows
    Take { count: usize },

    /// Split a column using examples, or by detection when none are given
    SplitColumnByExample {
        column: String,
        #[serde(default)]
        examples: Vec<SplitExample>,
    },

    /// Split a column with a known program
    SplitColumn {
        column: String,
        program: SplitProgram,
    },

    /// Add a column derived from examples
    DeriveColumnByExample {
        column: String,
        new_column: String,
        examples: Vec<DeriveExample>,
    },

    /// Add a column derived with a known program
    DeriveColumn {
        column: String,
        new_column: String,
        program: DeriveProgram,
    },
}

impl Step {
    /// Stable operation name, as used in the `op` tag and in error context.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReplaceNa { .. } => "replace_na",
            Self::DropNulls { .. } => "drop_nulls",
            Self::RenameColumns { .. } => "rename_columns",
            Self::KeepColumns { .. } => "keep_columns",
            Self::DropColumns { .. } => "drop_columns",
            Self::Replace { .. } => "replace",
            Self::FillNulls { .. } => "fill_nulls",
            Self::ToNumber { .. } => "to_number",
            Self::SetColumnTypes { .. } => "set_column_types",
            Self::Filter { .. } => "filter",
            Self::Take { .. } => "take",
            Self::SplitColumnByExample { .. } => "split_column_by_example",
            Self::SplitColumn { .. } => "split_column",
            Self::DeriveColumnByExample { .. } => "derive_column_by_example",
            Self::DeriveColumn { .. } => "derive_column",
        }
    }

    /// Whether the step needs inference before it can run.
    pub fn is_by_example(&self) -> bool {
        matches!(
            self,
            Self::SplitColumnByExample { .. } | Self::DeriveColumnByExample { .. }
        )
    }

    /// One-line human readable description.
    pub fn description(&self) -> String {
        match self {
            Self::ReplaceNa { columns, tokens } => match tokens {
                Some(tokens) => format!(
                    "replace {} null tokens in {}",
                    tokens.len(),
                    columns.describe()
                ),
                None => format!("replace null tokens in {}", columns.describe()),
            },
            Self::DropNulls {
                columns,
                relationship,
            } => format!(
                "drop rows where {} of {} is null",
                match relationship {
                    NullRelationship::Any => "any",
                    NullRelationship::All => "all",
                },
                columns.describe()
            ),
            Self::RenameColumns { pairs } => format!(
                "rename {}",
                pairs
                    .iter()
                    .map(|(from, to)| format!("{from} -> {to}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::KeepColumns { columns } => format!("keep {}", columns.describe()),
            Self::DropColumns { columns } => format!("drop {}", columns.describe()),
            Self::Replace {
                columns,
                find,
                replace_with,
            } => format!(
                "replace '{find}' with '{replace_with}' in {}",
                columns.describe()
            ),
            Self::FillNulls { columns, value } => {
                format!("fill nulls in {} with '{value}'", columns.describe())
            }
            Self::ToNumber { columns } => format!("convert {} to numbers", columns.describe()),
            Self::SetColumnTypes {
                conversions,
                on_error,
            } => format!(
                "set types {} (on error: {})",
                conversions
                    .iter()
                    .map(|c| format!("{}: {}", c.column, c.target))
                    .collect::<Vec<_>>()
                    .join(", "),
                match on_error {
                    ConversionPolicy::Null => "null",
                    ConversionPolicy::Fail => "fail",
                }
            ),
            Self::Filter { predicate } => format!("filter {predicate}"),
            Self::Take { count } => format!("take {count} rows"),
            Self::SplitColumnByExample { column, examples } if examples.is_empty() => {
                format!("split {column} by detected delimiter")
            }
            Self::SplitColumnByExample { column, examples } => {
                format!("split {column} from {} examples", examples.len())
            }
            Self::SplitColumn { column, program } => format!("split {column}: {program}"),
            Self::DeriveColumnByExample {
                column,
                new_column,
                examples,
            } => format!(
                "derive {new_column} from {column} with {} examples",
                examples.len()
            ),
            Self::DeriveColumn {
                column,
                new_column,
                program,
            } => format!("derive {new_column} from {column}: {program}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::col;

    #[test]
    fn test_step_serialization() {
        let step = Step::DropNulls {
            columns: ColumnSelector::names(["pickup_datetime", "distance"]),
            relationship: NullRelationship::All,
        };

        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"op\":\"drop_nulls\""));
        assert!(json.contains("\"relationship\":\"all\""));

        let parsed: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, step);
    }

    #[test]
    fn test_defaults_on_deserialize() {
        let step: Step = serde_json::from_str(
            r#"{"op": "drop_nulls", "columns": {"kind": "names", "names": ["a"]}}"#,
        )
        .unwrap();
        assert_eq!(
            step,
            Step::DropNulls {
                columns: ColumnSelector::names(["a"]),
                relationship: NullRelationship::Any,
            }
        );
    }

    #[test]
    fn test_description() {
        let step = Step::Filter {
            predicate: col("distance").gt(0),
        };
        assert_eq!(step.name(), "filter");
        assert_eq!(step.description(), "filter distance > 0");
        assert!(!step.is_by_example());
    }
}
