//! Per-column statistics for a dataflow.
//!
//! Profiling pulls rows through the dataflow once (or up to the configured
//! `profile_sample_size`) and never fails on messy data: values that do not
//! fit a column's declared type are counted as mismatches.
//!
//! Key figures per column:
//! - count, null count and exact distinct count of non-null values
//! - min, max (ordered types) and mean (numeric types)
//! - a histogram of the types the values actually look like
//! - type consistency, the share of non-null values matching the declared type
//!
//! Columns declared `unknown` are summarised by the type most of their values
//! look like.

use crate::config::EngineSettings;
use crate::error::Result;
use crate::pipeline::RowStream;
use crate::record::{ColumnType, DateFormats, Value};
use crate::selector::ColumnSelector;
use crate::type_inference::{classify, fits};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub declared_type: ColumnType,
    /// Type the statistics were computed for
    pub effective_type: ColumnType,
    /// Rows scanned
    pub count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub mean: Option<f64>,
    /// Number of non-null values per observed type
    pub type_histogram: BTreeMap<ColumnType, usize>,
    /// Non-null values that do not fit the declared type
    pub type_mismatch: usize,
}

impl ColumnProfile {
    pub fn null_pct(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.null_count as f64 / self.count as f64) * 100.0
        }
    }

    /// Share of non-null values that fit the declared type; 1.0 when there
    /// are none.
    pub fn type_consistency(&self) -> f64 {
        let non_null = self.count - self.null_count;
        if non_null == 0 {
            1.0
        } else {
            (non_null - self.type_mismatch) as f64 / non_null as f64
        }
    }

    pub fn uniqueness_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.distinct_count as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    /// Rows scanned
    pub row_count: usize,
    /// Whether scanning stopped at the sample limit before the end
    pub sampled: bool,
    pub columns: Vec<ColumnProfile>,
}

impl DataProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for DataProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} rows{}",
            self.row_count,
            if self.sampled { " (sampled)" } else { "" }
        )?;
        for c in &self.columns {
            writeln!(
                f,
                "{}: {} nulls={} distinct={} min={} max={} consistency={:.2}",
                c.name,
                c.declared_type,
                c.null_count,
                c.distinct_count,
                c.min.as_ref().map_or_else(String::new, ToString::to_string),
                c.max.as_ref().map_or_else(String::new, ToString::to_string),
                c.type_consistency()
            )?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Range {
    min: Option<Value>,
    max: Option<Value>,
}

impl Range {
    fn observe(&mut self, value: &Value) {
        if self
            .min
            .as_ref()
            .is_none_or(|m| value.compare(m) == Some(Ordering::Less))
        {
            self.min = Some(value.clone());
        }
        if self
            .max
            .as_ref()
            .is_none_or(|m| value.compare(m) == Some(Ordering::Greater))
        {
            self.max = Some(value.clone());
        }
    }
}

struct Accumulator {
    name: String,
    declared: ColumnType,
    nulls: usize,
    distinct: HashSet<String>,
    histogram: BTreeMap<ColumnType, usize>,
    mismatch: usize,
    ranges: BTreeMap<ColumnType, Range>,
    /// Range over rendered text, whatever each value looks like
    text_range: Range,
    sum: f64,
    numeric: usize,
}

impl Accumulator {
    fn new(name: String, declared: ColumnType) -> Self {
        Self {
            name,
            declared,
            nulls: 0,
            distinct: HashSet::new(),
            histogram: BTreeMap::new(),
            mismatch: 0,
            ranges: BTreeMap::new(),
            text_range: Range::default(),
            sum: 0.0,
            numeric: 0,
        }
    }

    fn observe(&mut self, value: &Value, formats: &DateFormats<'_>) {
        let Some(observed) = classify(value, formats) else {
            self.nulls += 1;
            return;
        };
        self.distinct.insert(value.distinct_key());
        *self.histogram.entry(observed).or_default() += 1;
        if !fits(value, self.declared, formats) {
            self.mismatch += 1;
        }

        // Text is measured as the type it looks like
        let typed = match value {
            Value::Text(_) => value.convert(observed, formats).unwrap_or_else(|| value.clone()),
            other => other.clone(),
        };
        if let Some(n) = typed.as_f64() {
            self.sum += n;
            self.numeric += 1;
        }
        self.ranges.entry(observed).or_default().observe(&typed);
        self.text_range.observe(&Value::Text(value.render().into_owned()));
    }

    fn effective_type(&self) -> ColumnType {
        if self.declared != ColumnType::Unknown {
            return self.declared;
        }
        // Most frequent observed type; earlier types win ties
        self.histogram
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map_or(ColumnType::Unknown, |(t, _)| *t)
    }

    fn finish(mut self, count: usize) -> ColumnProfile {
        let effective = self.effective_type();
        let (min, max) = if effective == ColumnType::String {
            (self.text_range.min, self.text_range.max)
        } else if effective.is_ordered() {
            // Integers count towards a decimal column's range
            let mut range = self.ranges.remove(&effective).unwrap_or_default();
            if effective == ColumnType::Decimal
                && let Some(ints) = self.ranges.remove(&ColumnType::Integer)
            {
                for value in ints.min.iter().chain(&ints.max) {
                    range.observe(value);
                }
            }
            (range.min, range.max)
        } else {
            (None, None)
        };
        let mean = (matches!(effective, ColumnType::Integer | ColumnType::Decimal)
            && self.numeric > 0)
            .then(|| self.sum / self.numeric as f64);

        ColumnProfile {
            name: self.name,
            declared_type: self.declared,
            effective_type: effective,
            count,
            null_count: self.nulls,
            distinct_count: self.distinct.len(),
            min,
            max,
            mean,
            type_histogram: self.histogram,
            type_mismatch: self.mismatch,
        }
    }
}

/// Profile the selected columns of `stream`.
///
/// # Errors
///
/// `ColumnNotFound` for a named column that is absent, and any error raised
/// while pulling rows.
pub fn profile(
    stream: RowStream,
    columns: &ColumnSelector,
    settings: &EngineSettings,
) -> Result<DataProfile> {
    let indices = columns.resolve(stream.schema())?;
    let mut accumulators: Vec<(usize, Accumulator)> = indices
        .iter()
        .filter_map(|&i| stream.schema().field(i).map(|f| (i, f)))
        .map(|(i, f)| (i, Accumulator::new(f.name.clone(), f.dtype)))
        .collect();

    let formats = settings.formats();
    let limit = settings.profile_sample_size.unwrap_or(usize::MAX);
    let mut rows = stream.peekable();
    let mut row_count = 0;
    while row_count < limit {
        let Some(row) = rows.next() else {
            break;
        };
        let row = row?;
        for (i, acc) in &mut accumulators {
            acc.observe(row.get(*i).unwrap_or(&Value::Null), &formats);
        }
        row_count += 1;
    }
    let sampled = row_count == limit && rows.peek().is_some();

    tracing::debug!(rows = row_count, sampled, "Profiled {} columns", accumulators.len());
    Ok(DataProfile {
        row_count,
        sampled,
        columns: accumulators
            .into_iter()
            .map(|(_, acc)| acc.finish(row_count))
            .collect(),
    })
}
