//! Delimited text reader (CSV, TSV and friends).
//!
//! Every cell is read as text; typing is left to conversion steps. Ragged rows
//! are tolerated: short rows are padded with nulls and long rows truncated,
//! with a warning logged once per stream.

use crate::error::{Result, ResultExt as _, WrangleError};
use crate::pipeline::executor::RowStream;
use crate::record::{Field, Row, Schema, Value};
use std::fs::File;
use std::path::Path;

fn reader(path: &Path, delimiter: char) -> Result<csv::Reader<File>> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            WrangleError::InvalidStep(format!("delimiter {delimiter:?} is not an ASCII character"))
        })?;
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(file))
}

/// Column names from the header row (or `Column1..N` without one).
///
/// Empty names become `Column<i>`; repeated names get a `_<n>` suffix.
///
/// # Errors
///
/// `Io` when the file cannot be read, `DataProcessing` for a malformed header.
pub fn read_schema(path: &Path, delimiter: char, has_header: bool) -> Result<Schema> {
    let mut reader = reader(path, delimiter)?;
    let mut first = csv::StringRecord::new();
    if !reader.read_record(&mut first)? {
        tracing::warn!("Source {} is empty", path.display());
        return Ok(Schema::default());
    }

    if !has_header {
        return Schema::from_names((1..=first.len()).map(|i| format!("Column{i}")));
    }

    let mut schema = Schema::default();
    for (i, raw) in first.iter().enumerate() {
        let raw = if i == 0 {
            raw.trim_start_matches('\u{feff}')
        } else {
            raw
        };
        let base = if raw.trim().is_empty() {
            format!("Column{}", i + 1)
        } else {
            raw.trim().to_owned()
        };
        let mut name = base.clone();
        let mut n = 2;
        while schema.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        if name != base {
            tracing::warn!(
                "Duplicate column '{base}' in {} renamed to '{name}'",
                path.display()
            );
        }
        schema.push(Field::unknown(name))?;
    }
    Ok(schema)
}

/// Stream the data rows of the file as text cells aligned to `schema`.
///
/// # Errors
///
/// `Io` when the file cannot be opened.
pub fn open(path: &Path, delimiter: char, has_header: bool, schema: Schema) -> Result<RowStream> {
    let reader = reader(path, delimiter)?;
    let width = schema.len();
    let source = path.display().to_string();
    let mut warned = false;

    let rows = reader
        .into_records()
        .skip(usize::from(has_header))
        .enumerate()
        .map(move |(line, record)| -> Result<Row> {
            let record = record?;
            if record.len() != width && !warned {
                warned = true;
                tracing::warn!(
                    "{source}: record {} has {} fields, expected {width}; padding or truncating",
                    line + 1,
                    record.len()
                );
            }
            let mut row: Row = record
                .iter()
                .take(width)
                .map(|cell| Value::Text(cell.to_owned()))
                .collect();
            row.resize(width, Value::Null);
            Ok(row)
        });

    Ok(RowStream::new(schema, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_header_cleanup() {
        let (_dir, path) = write_csv("\u{feff}vendor,,vendor,distance\nVTS,x,y,1.5\n");
        let schema = read_schema(&path, ',', true).unwrap();
        assert_eq!(
            schema.names().collect::<Vec<_>>(),
            vec!["vendor", "Column2", "vendor_2", "distance"]
        );
    }

    #[test]
    fn test_ragged_rows_padded_and_truncated() -> Result<()> {
        let (_dir, path) = write_csv("a,b\n1\n2,3,4\n5,6\n");
        let schema = read_schema(&path, ',', true)?;
        let rows: Vec<Row> = open(&path, ',', true, schema)?.collect::<Result<_>>()?;

        assert_eq!(
            rows,
            vec![
                vec![Value::from("1"), Value::Null],
                vec![Value::from("2"), Value::from("3")],
                vec![Value::from("5"), Value::from("6")],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_headerless_file() -> Result<()> {
        let (_dir, path) = write_csv("x;1\ny;2\n");
        let schema = read_schema(&path, ';', false)?;
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["Column1", "Column2"]);

        let rows: Vec<Row> = open(&path, ';', false, schema)?.collect::<Result<_>>()?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let (_dir, path) = write_csv("a§b\n");
        assert!(read_schema(&path, '§', true).is_err());
    }
}
