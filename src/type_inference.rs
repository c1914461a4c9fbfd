//! Two-phase column type inference.
//!
//! [`ColumnTypesBuilder::learn`] samples the first rows of a dataflow and
//! proposes one type per column; the proposals can be inspected and edited
//! before [`ColumnTypesBuilder::to_dataflow`] turns them into a
//! `set_column_types` step.
//!
//! Candidate types are tried in a fixed order (boolean, integer, decimal,
//! date, datetime) and the first one every sampled value parses as wins;
//! `string` is the fallback. Nulls and blank text are skipped, so a numeric
//! column with empty cells still infers as numeric.

use crate::dataflow::Dataflow;
use crate::error::{Result, WrangleError};
use crate::pipeline::spec::{ConversionPolicy, TypeConversion};
use crate::record::value::{parse_bool, parse_decimal, parse_int};
use crate::record::{ColumnType, DateFormats, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether `value` can be represented as `target` without loss of meaning.
pub(crate) fn fits(value: &Value, target: ColumnType, formats: &DateFormats<'_>) -> bool {
    match value {
        Value::Null => true,
        Value::Text(text) => text_fits(text, target, formats),
        typed => match (typed.column_type(), target) {
            (_, ColumnType::String)
            | (Some(ColumnType::Integer), ColumnType::Decimal)
            | (Some(ColumnType::Date), ColumnType::DateTime)
            | (None, _) => true,
            (Some(actual), target) => actual == target,
        },
    }
}

fn text_fits(text: &str, target: ColumnType, formats: &DateFormats<'_>) -> bool {
    let text = text.trim();
    match target {
        ColumnType::Unknown | ColumnType::String => true,
        ColumnType::Boolean => parse_bool(text, false).is_some(),
        ColumnType::Integer => parse_int(text).is_some(),
        ColumnType::Decimal => parse_decimal(text).is_some(),
        // Only whole dates; datetimes are not silently truncated here
        ColumnType::Date => formats
            .dates
            .iter()
            .any(|f| NaiveDate::parse_from_str(text, f).is_ok()),
        ColumnType::DateTime => formats.parse_datetime(text).is_some(),
    }
}

/// Most specific type of a single value, as type inference would see it.
pub(crate) fn classify(value: &Value, formats: &DateFormats<'_>) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Text(_) => Some(
            ColumnType::INFERENCE_ORDER
                .into_iter()
                .find(|&t| fits(value, t, formats))
                .unwrap_or(ColumnType::String),
        ),
        typed => typed.column_type(),
    }
}

fn is_blank(value: &Value) -> bool {
    value.as_text().is_some_and(|t| t.trim().is_empty())
}

/// What inference saw for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInference {
    pub column: String,
    /// Type declared by the dataflow before conversion
    pub current: ColumnType,
    pub proposed: ColumnType,
    /// Non-null, non-blank values the proposal is based on
    pub sampled: usize,
}

/// Learn-then-apply builder for `set_column_types`.
#[derive(Debug, Clone)]
pub struct ColumnTypesBuilder {
    dataflow: Dataflow,
    learned: Option<Vec<ColumnInference>>,
    on_error: ConversionPolicy,
}

impl ColumnTypesBuilder {
    pub fn new(dataflow: Dataflow) -> Self {
        Self {
            dataflow,
            learned: None,
            on_error: ConversionPolicy::Null,
        }
    }

    /// Policy of the generated conversion step; values outside the sample
    /// may not parse.
    #[must_use]
    pub fn with_policy(mut self, on_error: ConversionPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// Sample the dataflow and propose a type for every column, replacing
    /// any earlier proposals and edits.
    ///
    /// # Errors
    ///
    /// Materialization errors of the underlying dataflow.
    pub fn learn(&mut self) -> Result<&mut Self> {
        let settings = self.dataflow.engine().settings().clone();
        let formats = settings.formats();
        let stream = self.dataflow.stream()?;
        let schema = stream.schema().clone();

        let mut samples: Vec<Vec<Value>> = vec![Vec::new(); schema.len()];
        for row in stream.take(settings.type_inference_sample_size) {
            for (column, value) in samples.iter_mut().zip(row?) {
                if !value.is_null() && !is_blank(&value) {
                    column.push(value);
                }
            }
        }

        let learned = schema
            .fields()
            .iter()
            .zip(&samples)
            .map(|(field, values)| {
                let proposed = if values.is_empty() && field.dtype != ColumnType::Unknown {
                    field.dtype
                } else if values.is_empty() {
                    ColumnType::String
                } else {
                    ColumnType::INFERENCE_ORDER
                        .into_iter()
                        .find(|&t| values.iter().all(|v| fits(v, t, &formats)))
                        .unwrap_or(ColumnType::String)
                };
                tracing::debug!(
                    column = %field.name,
                    sampled = values.len(),
                    "Inferred {proposed} (declared {})",
                    field.dtype
                );
                ColumnInference {
                    column: field.name.clone(),
                    current: field.dtype,
                    proposed,
                    sampled: values.len(),
                }
            })
            .collect();

        self.learned = Some(learned);
        Ok(self)
    }

    /// Per-column results of the last `learn`, in schema order.
    pub fn inspection(&self) -> &[ColumnInference] {
        self.learned.as_deref().unwrap_or_default()
    }

    /// Conversions `to_dataflow` would apply: columns whose proposed type
    /// differs from their declared type.
    pub fn conversions(&self) -> Vec<TypeConversion> {
        self.inspection()
            .iter()
            .filter(|c| c.proposed != c.current)
            .map(|c| TypeConversion::new(c.column.clone(), c.proposed))
            .collect()
    }

    /// Override the proposal for one column.
    ///
    /// # Errors
    ///
    /// `ColumnNotFound` when the column was not part of the learned schema.
    pub fn set(&mut self, column: &str, target: ColumnType) -> Result<()> {
        let inference = self
            .learned
            .as_mut()
            .and_then(|l| l.iter_mut().find(|c| c.column == column))
            .ok_or_else(|| WrangleError::column_not_found(column))?;
        inference.proposed = target;
        Ok(())
    }

    /// Leave one column as declared.
    pub fn remove(&mut self, column: &str) -> bool {
        match self
            .learned
            .as_mut()
            .and_then(|l| l.iter_mut().find(|c| c.column == column))
        {
            Some(inference) => {
                inference.proposed = inference.current;
                true
            }
            None => false,
        }
    }

    /// Dataflow with the learned conversions applied. When every column
    /// already has its proposed type the original dataflow is returned.
    ///
    /// # Errors
    ///
    /// `InvalidStep` when `learn` has not been called.
    pub fn to_dataflow(&self) -> Result<Dataflow> {
        if self.learned.is_none() {
            return Err(WrangleError::InvalidStep(
                "column types have not been learned yet".to_owned(),
            ));
        }
        let conversions = self.conversions();
        if conversions.is_empty() {
            return Ok(self.dataflow.clone());
        }
        self.dataflow
            .set_column_types_with(conversions, self.on_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::Engine;
    use crate::record::Frame;

    fn builder(engine: &Engine) -> ColumnTypesBuilder {
        let frame = Frame::from_text_rows(
            &["flag", "count", "fare", "day", "when", "vendor", "empty"],
            &[
                &["true", "1", "2", "2009-01-04", "2009-01-04 10:00:00", "VTS", ""],
                &["FALSE", "0", "2.5", "2013-08-22", "2013-08-22", "1", ""],
                &["", "", "", "", "", "", ""],
            ],
        )
        .unwrap();
        engine.from_frame(frame).column_types_builder()
    }

    #[test]
    fn test_learn_proposes_most_specific_type() {
        let engine = Engine::new();
        let mut builder = builder(&engine);
        builder.learn().unwrap();

        let proposed: Vec<ColumnType> = builder.inspection().iter().map(|c| c.proposed).collect();
        assert_eq!(
            proposed,
            vec![
                ColumnType::Boolean,
                ColumnType::Integer,
                ColumnType::Decimal,
                ColumnType::Date,
                ColumnType::DateTime,
                ColumnType::String,
                ColumnType::String,
            ]
        );
    }

    #[test]
    fn test_to_dataflow_is_idempotent() {
        let engine = Engine::new();
        let mut builder = builder(&engine);
        let typed = builder.learn().unwrap().to_dataflow().unwrap();
        assert_eq!(typed.schema().unwrap().field(1).map(|f| f.dtype), Some(ColumnType::Integer));
        assert_eq!(typed.head(1).unwrap().get(0, "count"), Some(&Value::Int(1)));

        let mut again = typed.column_types_builder();
        assert!(again.learn().unwrap().conversions().is_empty());
        assert_eq!(again.to_dataflow().unwrap().id(), typed.id());
    }

    #[test]
    fn test_edit_before_apply() {
        let engine = Engine::new();
        let mut builder = builder(&engine);
        builder.learn().unwrap();
        builder.set("count", ColumnType::Decimal).unwrap();
        assert!(builder.remove("flag"));
        assert!(builder.set("missing", ColumnType::Integer).is_err());

        let conversions = builder.conversions();
        assert!(conversions.iter().all(|c| c.column != "flag"));
        assert!(conversions
            .iter()
            .any(|c| c.column == "count" && c.target == ColumnType::Decimal));
    }

    #[test]
    fn test_to_dataflow_requires_learn() {
        let engine = Engine::new();
        assert!(builder(&engine).to_dataflow().is_err());
    }
}
