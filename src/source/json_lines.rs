//! JSON-lines reader: one JSON object per line.
//!
//! The schema is the union of keys over the first lines, in first-seen order.
//! Keys that only appear later are ignored; missing keys read as null.

use crate::error::{Result, ResultExt as _, WrangleError};
use crate::pipeline::executor::RowStream;
use crate::record::{Field, Row, Schema, Value};
use serde_json::{Map, Value as JsonValue};
use std::fs::File;
use std::io::{BufRead as _, BufReader};
use std::path::Path;

fn parse_object(line: &str, line_no: usize) -> Result<Map<String, JsonValue>> {
    match serde_json::from_str::<JsonValue>(line) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(WrangleError::DataProcessing(format!(
            "line {line_no}: expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(WrangleError::DataProcessing(format!("line {line_no}: {e}"))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        JsonValue::String(s) => Value::Text(s.clone()),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::Text(nested.to_string()),
    }
}

fn lines(path: &Path) -> Result<impl Iterator<Item = (usize, std::io::Result<String>)> + use<>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line)))
}

/// Keys of the first `sample` non-blank lines.
///
/// # Errors
///
/// `Io` on read failure, `DataProcessing` when a sampled line is not a
/// JSON object.
pub fn read_schema(path: &Path, sample: usize) -> Result<Schema> {
    let mut schema = Schema::default();
    let mut seen = 0;
    for (line_no, line) in lines(path)? {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        for key in parse_object(&line, line_no)?.keys() {
            if !schema.contains(key) {
                schema.push(Field::unknown(key.clone()))?;
            }
        }
        seen += 1;
        if seen >= sample {
            break;
        }
    }
    Ok(schema)
}

/// # Errors
///
/// `Io` when the file cannot be opened.
pub fn open(path: &Path, schema: Schema) -> Result<RowStream> {
    let names: Vec<String> = schema.names().map(str::to_owned).collect();
    let rows = lines(path)?.filter_map(move |(line_no, line)| -> Option<Result<Row>> {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        if line.trim().is_empty() {
            return None;
        }
        Some(parse_object(&line, line_no).map(|object| {
            names
                .iter()
                .map(|name| object.get(name).map_or(Value::Null, to_value))
                .collect()
        }))
    });
    Ok(RowStream::new(schema, rows))
}
