//! Row-level implementations of every step.
//!
//! Each step resolves its selectors against the input schema when the stream
//! is opened, computes the output schema, and wraps the input rows in a lazy
//! per-row transformation.

use super::executor::RowStream;
use super::spec::{ConversionPolicy, NullRelationship, SchemaPolicy, Step, TypeConversion};
use crate::config::EngineSettings;
use crate::error::{Result, WrangleError};
use crate::inference::{DeriveProgram, SplitProgram, split_column_names};
use crate::record::{ColumnType, Field, Row, Schema, Value};
use std::sync::Arc;

/// Apply a single step to an input stream.
///
/// # Errors
///
/// `ColumnNotFound`, `SchemaConflict` or `InferenceAmbiguous` when the
/// step does not fit the input schema or data.
pub fn apply(step: &Step, input: RowStream, settings: &Arc<EngineSettings>) -> Result<RowStream> {
    match step {
        Step::ReplaceNa { columns, tokens } => {
            let indices = columns.resolve(input.schema())?;
            let tokens = tokens
                .clone()
                .unwrap_or_else(|| settings.null_tokens.clone());
            let schema = input.schema().clone();
            Ok(map_rows(input, schema, move |mut row| {
                for &i in &indices {
                    if let Some(cell) = row.get_mut(i)
                        && is_na(cell, &tokens)
                    {
                        *cell = Value::Null;
                    }
                }
                Ok(row)
            }))
        }

        Step::DropNulls {
            columns,
            relationship,
        } => {
            let indices = columns.resolve(input.schema())?;
            if indices.is_empty() {
                return Ok(input);
            }
            let relationship = *relationship;
            Ok(filter_rows(input, move |row| {
                let mut nulls = indices
                    .iter()
                    .map(|&i| row.get(i).is_none_or(Value::is_null));
                let drop = match relationship {
                    NullRelationship::Any => nulls.any(|null| null),
                    NullRelationship::All => nulls.all(|null| null),
                };
                Ok(!drop)
            }))
        }

        Step::RenameColumns { pairs } => {
            let schema = rename_schema(input.schema(), pairs)?;
            let (_, rows) = input.into_parts();
            Ok(RowStream::new(schema, rows))
        }

        Step::KeepColumns { columns } => {
            let mut indices = columns.resolve(input.schema())?;
            indices.sort_unstable();
            Ok(project(input, &indices))
        }

        Step::DropColumns { columns } => {
            let dropped = columns.resolve(input.schema())?;
            let kept: Vec<usize> = (0..input.schema().len())
                .filter(|i| !dropped.contains(i))
                .collect();
            Ok(project(input, &kept))
        }

        Step::Replace {
            columns,
            find,
            replace_with,
        } => {
            let indices = columns.resolve(input.schema())?;
            let mut schema = input.schema().clone();
            // A replacement of another type makes the column's type unknown
            for &i in &indices {
                let dtype = schema.field(i).map_or(ColumnType::Unknown, |f| f.dtype);
                if !replace_with.matches_type(dtype) {
                    schema.set_dtype(i, ColumnType::Unknown);
                }
            }
            let find = find.clone();
            let replace_with = replace_with.clone();
            Ok(map_rows(input, schema, move |mut row| {
                for &i in &indices {
                    if let Some(cell) = row.get_mut(i)
                        && text_matches(cell, &find)
                    {
                        *cell = replace_with.clone();
                    }
                }
                Ok(row)
            }))
        }

        Step::FillNulls { columns, value } => {
            let indices = columns.resolve(input.schema())?;
            let mut schema = input.schema().clone();
            let formats = settings.formats();
            let mut fills = Vec::with_capacity(indices.len());
            for &i in &indices {
                let dtype = schema.field(i).map_or(ColumnType::Unknown, |f| f.dtype);
                match value.convert(dtype, &formats) {
                    Some(fill) => fills.push((i, fill)),
                    None => {
                        tracing::warn!(
                            "Fill value '{value}' is not a valid {dtype}; column type becomes unknown"
                        );
                        schema.set_dtype(i, ColumnType::Unknown);
                        fills.push((i, value.clone()));
                    }
                }
            }
            Ok(map_rows(input, schema, move |mut row| {
                for (i, fill) in &fills {
                    if let Some(cell) = row.get_mut(*i)
                        && cell.is_null()
                    {
                        *cell = fill.clone();
                    }
                }
                Ok(row)
            }))
        }

        Step::ToNumber { columns } => {
            let indices = columns.resolve(input.schema())?;
            let mut schema = input.schema().clone();
            for &i in &indices {
                schema.set_dtype(i, ColumnType::Decimal);
            }
            let settings = Arc::clone(settings);
            Ok(map_rows(input, schema, move |mut row| {
                let formats = settings.formats();
                for &i in &indices {
                    if let Some(cell) = row.get_mut(i) {
                        *cell = cell
                            .convert(ColumnType::Decimal, &formats)
                            .unwrap_or(Value::Null);
                    }
                }
                Ok(row)
            }))
        }

        Step::SetColumnTypes {
            conversions,
            on_error,
        } => set_column_types(input, conversions, *on_error, settings),

        Step::Filter { predicate } => {
            let bound = predicate.bind(input.schema())?;
            let settings = Arc::clone(settings);
            Ok(filter_rows(input, move |row| {
                Ok(bound.eval(row, &settings.formats()) == Some(true))
            }))
        }

        Step::Take { count } => {
            let (schema, rows) = input.into_parts();
            Ok(RowStream::new(schema, rows.take(*count)))
        }

        Step::SplitColumn { column, program } => split_column(input, column, program),

        Step::DeriveColumn {
            column,
            new_column,
            program,
        } => derive_column(input, column, new_column, program),

        Step::SplitColumnByExample { .. } | Step::DeriveColumnByExample { .. } => {
            Err(WrangleError::Other(format!(
                "{} must be resolved to a program before it runs",
                step.name()
            )))
        }
    }
}

/// Concatenate streams vertically.
///
/// With [`SchemaPolicy::Pad`] the output has every column of every input in
/// first-seen order; a column whose inputs disagree on its type is declared
/// `Unknown`. With [`SchemaPolicy::Reject`] all inputs must have identical
/// schemas.
///
/// # Errors
///
/// `InvalidStep` with no inputs; `SchemaConflict` when `Reject` meets
/// differing schemas.
pub fn append(inputs: Vec<RowStream>, policy: SchemaPolicy) -> Result<RowStream> {
    let parts: Vec<(Schema, _)> = inputs.into_iter().map(RowStream::into_parts).collect();
    let Some((first, _)) = parts.first() else {
        return Err(WrangleError::InvalidStep(
            "append_rows needs at least one input".to_owned(),
        ));
    };

    let schema = match policy {
        SchemaPolicy::Reject => {
            if let Some((other, _)) = parts.iter().find(|(s, _)| s != first) {
                return Err(WrangleError::SchemaConflict(format!(
                    "cannot append [{}] to [{}]",
                    describe_schema(other),
                    describe_schema(first)
                )));
            }
            first.clone()
        }
        SchemaPolicy::Pad => union_schema(parts.iter().map(|(s, _)| s))?,
    };

    let width = schema.len();
    let streams: Vec<_> = parts
        .into_iter()
        .map(|(input_schema, rows)| {
            // Position in the input for each output column
            let positions: Vec<Option<usize>> =
                schema.names().map(|n| input_schema.index_of(n)).collect();
            rows.map(move |row| {
                let mut row = row?;
                let mut out = Vec::with_capacity(width);
                for position in &positions {
                    out.push(
                        position
                            .and_then(|p| row.get_mut(p))
                            .map(std::mem::take)
                            .unwrap_or_default(),
                    );
                }
                Ok(out)
            })
        })
        .collect();

    Ok(RowStream::new(schema, streams.into_iter().flatten()))
}

fn map_rows(
    input: RowStream,
    schema: Schema,
    mut f: impl FnMut(Row) -> Result<Row> + Send + 'static,
) -> RowStream {
    let (_, rows) = input.into_parts();
    RowStream::new(schema, rows.map(move |row| row.and_then(&mut f)))
}

fn filter_rows(
    input: RowStream,
    mut keep: impl FnMut(&Row) -> Result<bool> + Send + 'static,
) -> RowStream {
    let (schema, rows) = input.into_parts();
    let rows = rows.filter_map(move |row| match row {
        Ok(row) => match keep(&row) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    });
    RowStream::new(schema, rows)
}

fn project(input: RowStream, indices: &[usize]) -> RowStream {
    let schema = input.schema().project(indices);
    let indices = indices.to_vec();
    map_rows(input, schema, move |mut row| {
        Ok(indices
            .iter()
            .map(|&i| row.get_mut(i).map(std::mem::take).unwrap_or_default())
            .collect())
    })
}

fn is_na(cell: &Value, tokens: &[String]) -> bool {
    match cell {
        Value::Text(text) => {
            let text = text.trim();
            tokens.iter().any(|t| t.trim() == text)
        }
        Value::Float(f) => f.is_nan(),
        _ => false,
    }
}

// Null `find` matches null cells; otherwise rendered text must be equal.
fn text_matches(cell: &Value, find: &Value) -> bool {
    match (cell, find) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (cell, find) => cell.render() == find.render(),
    }
}

/// Simultaneous rename; a source name listed twice takes its last target.
fn rename_schema(schema: &Schema, pairs: &[(String, String)]) -> Result<Schema> {
    for (from, _) in pairs {
        schema.require(from)?;
    }
    let fields = schema
        .fields()
        .iter()
        .map(|field| {
            let name = pairs
                .iter()
                .rev()
                .find(|(from, _)| *from == field.name)
                .map_or_else(|| field.name.clone(), |(_, to)| to.clone());
            Field::new(name, field.dtype)
        })
        .collect();
    Schema::new(fields).map_err(|e| match e {
        WrangleError::SchemaConflict(msg) => {
            WrangleError::SchemaConflict(format!("rename produces a {msg}"))
        }
        other => other,
    })
}

fn set_column_types(
    input: RowStream,
    conversions: &[TypeConversion],
    on_error: ConversionPolicy,
    settings: &Arc<EngineSettings>,
) -> Result<RowStream> {
    let mut schema = input.schema().clone();
    let mut plan = Vec::with_capacity(conversions.len());
    for conversion in conversions {
        let idx = schema.require(&conversion.column)?;
        schema.set_dtype(idx, conversion.target);
        plan.push((idx, conversion.clone()));
    }

    let settings = Arc::clone(settings);
    Ok(map_rows(input, schema, move |mut row| {
        for (idx, conversion) in &plan {
            let formats = settings.formats().with_explicit(conversion.format.as_deref());
            let Some(cell) = row.get_mut(*idx) else {
                continue;
            };
            match cell.convert(conversion.target, &formats) {
                Some(converted) => *cell = converted,
                None if on_error == ConversionPolicy::Null => *cell = Value::Null,
                None => {
                    return Err(WrangleError::TypeConversionFailure {
                        column: conversion.column.clone(),
                        value: cell.render().into_owned(),
                        target: conversion.target,
                    });
                }
            }
        }
        Ok(row)
    }))
}

fn split_column(input: RowStream, column: &str, program: &SplitProgram) -> Result<RowStream> {
    let idx = input.schema().require(column)?;
    let names = split_column_names(input.schema(), column, program.width());
    let mut schema = input.schema().clone();
    for (offset, name) in names.into_iter().enumerate() {
        schema.insert(idx + 1 + offset, Field::new(name, ColumnType::String))?;
    }

    let program = program.clone();
    Ok(map_rows(input, schema, move |mut row| {
        let parts = match row.get(idx) {
            Some(Value::Null) | None => program.apply(None),
            Some(value) => program.apply(Some(&value.render())),
        };
        let at = (idx + 1).min(row.len());
        row.splice(at..at, parts);
        Ok(row)
    }))
}

fn derive_column(
    input: RowStream,
    column: &str,
    new_column: &str,
    program: &DeriveProgram,
) -> Result<RowStream> {
    let idx = input.schema().require(column)?;
    if input.schema().contains(new_column) {
        return Err(WrangleError::SchemaConflict(format!(
            "derived column '{new_column}' already exists"
        )));
    }
    let mut schema = input.schema().clone();
    schema.insert(idx + 1, Field::new(new_column, ColumnType::String))?;

    let program = program.clone();
    Ok(map_rows(input, schema, move |mut row| {
        let derived = row
            .get(idx)
            .map_or(Value::Null, |value| program.apply_value(value));
        let at = (idx + 1).min(row.len());
        row.insert(at, derived);
        Ok(row)
    }))
}

fn union_schema<'a>(schemas: impl Iterator<Item = &'a Schema>) -> Result<Schema> {
    let mut union = Schema::default();
    for schema in schemas {
        for field in schema.fields() {
            match union.index_of(&field.name) {
                Some(i) => {
                    if union.field(i).is_some_and(|f| f.dtype != field.dtype) {
                        union.set_dtype(i, ColumnType::Unknown);
                    }
                }
                None => union.push(field.clone())?,
            }
        }
    }
    Ok(union)
}

fn describe_schema(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name, f.dtype))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};
    use crate::record::Frame;
    use crate::selector::ColumnSelector;

    fn stream(names: &[&str], rows: &[&[&str]]) -> RowStream {
        let frame = Frame::from_text_rows(names, rows).unwrap();
        RowStream::from_rows(frame.schema().clone(), frame.into_rows())
    }

    fn run(step: Step, input: RowStream) -> Result<Frame> {
        let settings = Arc::new(EngineSettings::default());
        apply(&step, input, &settings)?.collect_frame(crate::pipeline::Demand::All)
    }

    fn texts(frame: &Frame, column: &str) -> Vec<String> {
        frame
            .column(column)
            .unwrap()
            .into_iter()
            .map(|v| v.render().into_owned())
            .collect()
    }

    #[test]
    fn test_replace_na_uses_configured_tokens() {
        let input = stream(&["tip"], &[&["N/A"], &[" 1.5 "], &["  "], &["-"]]);
        let frame = run(
            Step::ReplaceNa {
                columns: ColumnSelector::All,
                tokens: None,
            },
            input,
        )
        .unwrap();
        let nulls: Vec<bool> = frame.column("tip").unwrap().iter().map(|v| v.is_null()).collect();
        assert_eq!(nulls, vec![true, false, true, true]);
    }

    #[test]
    fn test_drop_nulls_any_and_all() {
        let rows: Vec<Row> = vec![
            vec![Value::Null, Value::Null],
            vec![Value::Null, Value::from("x")],
            vec![Value::from("y"), Value::from("z")],
        ];
        let schema = Schema::from_names(["a", "b"]).unwrap();

        let any = run(
            Step::DropNulls {
                columns: ColumnSelector::All,
                relationship: NullRelationship::Any,
            },
            RowStream::from_rows(schema.clone(), rows.clone()),
        )
        .unwrap();
        assert_eq!(any.height(), 1);

        let all = run(
            Step::DropNulls {
                columns: ColumnSelector::All,
                relationship: NullRelationship::All,
            },
            RowStream::from_rows(schema, rows),
        )
        .unwrap();
        assert_eq!(all.height(), 2);
    }

    #[test]
    fn test_rename_is_simultaneous() {
        let input = stream(&["a", "b"], &[&["1", "2"]]);
        let frame = run(
            Step::RenameColumns {
                pairs: vec![("a".into(), "b".into()), ("b".into(), "a".into())],
            },
            input,
        )
        .unwrap();
        assert_eq!(frame.schema().names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(frame.get(0, "b"), Some(&Value::from("1")));
    }

    #[test]
    fn test_rename_collision_is_schema_conflict() {
        let input = stream(&["a", "b"], &[&["1", "2"]]);
        let result = run(
            Step::RenameColumns {
                pairs: vec![("a".into(), "b".into())],
            },
            input,
        );
        assert!(matches!(result, Err(WrangleError::SchemaConflict(_))));
    }

    #[test]
    fn test_keep_preserves_schema_order() {
        let input = stream(&["a", "b", "c"], &[&["1", "2", "3"]]);
        let frame = run(
            Step::KeepColumns {
                columns: ColumnSelector::names(["c", "a"]),
            },
            input,
        )
        .unwrap();
        assert_eq!(frame.schema().names().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(frame.rows(), &[vec![Value::from("1"), Value::from("3")]]);
    }

    #[test]
    fn test_replace_then_to_number_then_fill() {
        let settings = Arc::new(EngineSettings::default());
        let input = stream(&["tip"], &[&[".00"], &["3.5"], &[""]]);
        let steps = [
            Step::Replace {
                columns: "tip".into(),
                find: Value::from(".00"),
                replace_with: Value::Int(0),
            },
            Step::ToNumber {
                columns: "tip".into(),
            },
            Step::FillNulls {
                columns: "tip".into(),
                value: Value::Int(0),
            },
        ];
        let mut current = input;
        for step in &steps {
            current = apply(step, current, &settings).unwrap();
        }
        let frame = current.collect_frame(crate::pipeline::Demand::All).unwrap();
        assert_eq!(
            frame.column("tip").unwrap(),
            vec![&Value::Float(0.0), &Value::Float(3.5), &Value::Float(0.0)]
        );
        assert_eq!(frame.schema().field(0).map(|f| f.dtype), Some(ColumnType::Decimal));
    }

    #[test]
    fn test_set_column_types_policies() {
        let conversions = vec![TypeConversion::new("n", ColumnType::Integer)];
        let lenient = run(
            Step::SetColumnTypes {
                conversions: conversions.clone(),
                on_error: ConversionPolicy::Null,
            },
            stream(&["n"], &[&["4"], &["four"]]),
        )
        .unwrap();
        assert_eq!(lenient.column("n").unwrap(), vec![&Value::Int(4), &Value::Null]);

        let strict = run(
            Step::SetColumnTypes {
                conversions,
                on_error: ConversionPolicy::Fail,
            },
            stream(&["n"], &[&["4"], &["four"]]),
        );
        assert!(matches!(
            strict,
            Err(WrangleError::TypeConversionFailure { ref value, .. }) if value == "four"
        ));
    }

    #[test]
    fn test_explicit_date_format() {
        let frame = run(
            Step::SetColumnTypes {
                conversions: vec![
                    TypeConversion::new("day", ColumnType::Date).with_format("%d|%m|%Y"),
                ],
                on_error: ConversionPolicy::Null,
            },
            stream(&["day"], &[&["04|01|2009"]]),
        )
        .unwrap();
        assert_eq!(texts(&frame, "day"), vec!["2009-01-04"]);
    }

    #[test]
    fn test_filter_null_is_false() {
        let input = stream(&["distance"], &[&["2.5"], &[""], &["0"], &["abc"]]);
        let frame = run(
            Step::Filter {
                predicate: col("distance").gt(lit(0)),
            },
            input,
        )
        .unwrap();
        assert_eq!(texts(&frame, "distance"), vec!["2.5"]);
    }

    #[test]
    fn test_split_inserts_after_source() {
        let input = stream(&["when", "fare"], &[&["2013-08-22 10:00:00", "5"], &["", "6"]]);
        let frame = run(
            Step::SplitColumn {
                column: "when".into(),
                program: SplitProgram::Delimiter {
                    delimiter: " ".into(),
                    columns: 2,
                },
            },
            input,
        )
        .unwrap();
        assert_eq!(
            frame.schema().names().collect::<Vec<_>>(),
            vec!["when", "when_1", "when_2", "fare"]
        );
        assert_eq!(frame.get(1, "when_2"), Some(&Value::Null));
        assert_eq!(frame.get(1, "fare"), Some(&Value::from("6")));
    }

    #[test]
    fn test_derive_rejects_existing_column() {
        let input = stream(&["a", "b"], &[&["1", "2"]]);
        let result = run(
            Step::DeriveColumn {
                column: "a".into(),
                new_column: "b".into(),
                program: DeriveProgram::extract(crate::inference::Extractor::Whole),
            },
            input,
        );
        assert!(matches!(result, Err(WrangleError::SchemaConflict(_))));
    }

    #[test]
    fn test_append_pads_missing_columns() {
        let left = stream(&["a", "b"], &[&["1", "2"]]);
        let right = stream(&["b", "c"], &[&["3", "4"]]);
        let frame = append(vec![left, right], SchemaPolicy::Pad)
            .unwrap()
            .collect_frame(crate::pipeline::Demand::All)
            .unwrap();

        assert_eq!(frame.schema().names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(
            frame.rows(),
            &[
                vec![Value::from("1"), Value::from("2"), Value::Null],
                vec![Value::Null, Value::from("3"), Value::from("4")],
            ]
        );
    }

    #[test]
    fn test_append_reject_requires_same_schema() {
        let left = stream(&["a"], &[&["1"]]);
        let right = stream(&["b"], &[&["2"]]);
        assert!(matches!(
            append(vec![left, right], SchemaPolicy::Reject),
            Err(WrangleError::SchemaConflict(_))
        ));
    }
}
