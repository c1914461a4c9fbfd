//! Construction-time step validation.
//!
//! Everything that can be checked without looking at data is checked here,
//! when a step is applied. Checks that need a schema (does the column exist,
//! does a rename collide) run at materialization, because selectors are
//! resolved against the live schema.

use super::spec::{Step, TypeConversion};
use crate::error::{Result, WrangleError};
use crate::record::ColumnType;

fn invalid(step: &Step, message: impl std::fmt::Display) -> WrangleError {
    WrangleError::InvalidStep(format!("{}: {message}", step.name()))
}

/// Reject malformed steps before they enter the graph.
///
/// # Errors
///
/// `InvalidStep` describing the first problem found.
pub fn validate_step(step: &Step) -> Result<()> {
    match step {
        Step::ReplaceNa { columns, tokens } => {
            columns.validate()?;
            if tokens.as_ref().is_some_and(Vec::is_empty) {
                return Err(invalid(step, "token list is empty"));
            }
        }

        Step::DropNulls { columns, .. }
        | Step::KeepColumns { columns }
        | Step::DropColumns { columns }
        | Step::Replace { columns, .. }
        | Step::FillNulls { columns, .. }
        | Step::ToNumber { columns } => columns.validate()?,

        Step::RenameColumns { pairs } => {
            if pairs.is_empty() {
                return Err(invalid(step, "no columns to rename"));
            }
            if let Some((from, to)) = pairs.iter().find(|(f, t)| f.is_empty() || t.is_empty()) {
                return Err(invalid(
                    step,
                    format!("empty column name in pair '{from}' -> '{to}'"),
                ));
            }
        }

        Step::SetColumnTypes { conversions, .. } => {
            if conversions.is_empty() {
                return Err(invalid(step, "no conversions given"));
            }
            for conversion in conversions {
                validate_conversion(step, conversion)?;
            }
        }

        Step::Filter { predicate } => predicate.validate_predicate()?,

        Step::Take { .. } => {}

        Step::SplitColumnByExample { column, examples } => {
            require_column_name(step, column)?;
            if let Some(first) = examples.first() {
                let width = first.outputs.len();
                if width == 0 {
                    return Err(invalid(step, "examples must list at least one output"));
                }
                if let Some(bad) = examples.iter().find(|e| e.outputs.len() != width) {
                    return Err(invalid(
                        step,
                        format!(
                            "example '{}' has {} outputs, expected {width}",
                            bad.input,
                            bad.outputs.len()
                        ),
                    ));
                }
            }
        }

        Step::SplitColumn { column, program } => {
            require_column_name(step, column)?;
            program.validate()?;
        }

        Step::DeriveColumnByExample {
            column,
            new_column,
            examples,
        } => {
            require_column_name(step, column)?;
            require_column_name(step, new_column)?;
            if examples.is_empty() {
                return Err(invalid(step, "at least one example is required"));
            }
        }

        Step::DeriveColumn {
            column,
            new_column,
            program,
        } => {
            require_column_name(step, column)?;
            require_column_name(step, new_column)?;
            program.validate()?;
        }
    }
    Ok(())
}

fn require_column_name(step: &Step, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(step, "column name must not be empty"));
    }
    Ok(())
}

fn validate_conversion(step: &Step, conversion: &TypeConversion) -> Result<()> {
    require_column_name(step, &conversion.column)?;
    if conversion.target == ColumnType::Unknown {
        return Err(invalid(
            step,
            format!("column '{}' cannot be converted to unknown", conversion.column),
        ));
    }
    if let Some(format) = &conversion.format {
        if !matches!(conversion.target, ColumnType::Date | ColumnType::DateTime) {
            return Err(invalid(
                step,
                format!(
                    "format '{format}' given for non-temporal column '{}'",
                    conversion.column
                ),
            ));
        }
        if format.trim().is_empty() {
            return Err(invalid(step, "date format must not be empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};
    use crate::inference::SplitExample;
    use crate::selector::ColumnSelector;

    #[test]
    fn test_valid_steps_pass() {
        let steps = vec![
            Step::ReplaceNa {
                columns: ColumnSelector::All,
                tokens: None,
            },
            Step::Filter {
                predicate: col("distance").gt(0),
            },
            Step::SetColumnTypes {
                conversions: vec![
                    TypeConversion::new("pickup_date", ColumnType::Date).with_format("%Y-%m-%d"),
                ],
                on_error: Default::default(),
            },
        ];
        for step in &steps {
            assert!(validate_step(step).is_ok(), "{step:?}");
        }
    }

    #[test]
    fn test_malformed_predicate_rejected() {
        let step = Step::Filter {
            predicate: lit("not a predicate"),
        };
        assert!(matches!(
            validate_step(&step),
            Err(WrangleError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_mismatched_split_examples_rejected() {
        let step = Step::SplitColumnByExample {
            column: "pickup_datetime".to_owned(),
            examples: vec![
                SplitExample::new("2013-08-22 10:00:00", ["2013-08-22", "10:00:00"]),
                SplitExample::new("2013-08-23 11:00:00", ["2013-08-23"]),
            ],
        };
        let err = validate_step(&step).unwrap_err();
        assert!(err.to_string().contains("split_column_by_example"));
    }

    #[test]
    fn test_format_only_for_temporal_targets() {
        let step = Step::SetColumnTypes {
            conversions: vec![TypeConversion::new("fare", ColumnType::Decimal).with_format("%d")],
            on_error: Default::default(),
        };
        assert!(validate_step(&step).is_err());
    }
}
