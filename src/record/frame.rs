use super::schema::Schema;
use super::value::Value;
use crate::error::{Result, WrangleError};
use serde::{Deserialize, Serialize};

/// One row; cells are aligned with the owning schema's fields.
pub type Row = Vec<Value>;

/// A materialized block of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    schema: Schema,
    rows: Vec<Row>,
}

impl Frame {
    /// Build a frame, checking every row has one cell per field.
    ///
    /// # Errors
    ///
    /// `DataProcessing` when a row's length differs from the schema.
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != schema.len())
        {
            return Err(WrangleError::DataProcessing(format!(
                "row {idx} has {} cells, schema has {} columns",
                row.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, rows })
    }

    /// Frame of untyped text cells; empty strings stay empty strings.
    ///
    /// # Errors
    ///
    /// As for [`Self::new`], or `SchemaConflict` for repeated names.
    pub fn from_text_rows(names: &[&str], rows: &[&[&str]]) -> Result<Self> {
        let schema = Schema::from_names(names.iter().copied())?;
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|&cell| Value::from(cell)).collect())
            .collect();
        Self::new(schema, rows)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.schema.len()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All cells of one column, top to bottom.
    ///
    /// # Errors
    ///
    /// `ColumnNotFound` when there is no such column.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.schema.require(name)?;
        Ok(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }

    /// Row `index` as (column name, value) pairs in schema order.
    pub fn record(&self, index: usize) -> Option<Vec<(&str, &Value)>> {
        let row = self.rows.get(index)?;
        Some(self.schema.names().zip(row.iter()).collect())
    }

    /// Render the frame as CSV with a header line. Nulls become empty fields.
    ///
    /// # Errors
    ///
    /// `DataProcessing` when the CSV writer fails.
    pub fn to_csv_string(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.schema.names())?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| v.render().into_owned()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| WrangleError::DataProcessing(format!("CSV writer error: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| WrangleError::DataProcessing(format!("CSV output is not UTF-8: {e}")))
    }
}
