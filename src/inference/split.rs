//! Example-free column splitting and split column naming.

use super::program::SplitProgram;
use crate::config::EngineSettings;
use crate::error::{Result, WrangleError};
use crate::record::Schema;
use crate::record::value::{parse_decimal, parse_int};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

// Tried first, in this order, when two delimiters score the same.
const PREFERRED_DELIMITERS: [char; 10] = [',', '\t', ';', '|', ' ', '-', '/', ':', '.', '_'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PartClass {
    Empty,
    Integer,
    Decimal,
    Date,
    Time,
    DateTime,
    Text,
}

impl PartClass {
    fn of(text: &str, settings: &EngineSettings) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Self::Empty
        } else if parse_int(text).is_some() {
            Self::Integer
        } else if parse_decimal(text).is_some() {
            Self::Decimal
        } else if settings
            .date_formats
            .iter()
            .any(|f| NaiveDate::parse_from_str(text, f).is_ok())
        {
            Self::Date
        } else if settings
            .datetime_formats
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(text, f).is_ok())
        {
            Self::DateTime
        } else if ["%H:%M:%S", "%H:%M"]
            .iter()
            .any(|f| NaiveTime::parse_from_str(text, f).is_ok())
        {
            Self::Time
        } else {
            Self::Text
        }
    }

    fn weight(self) -> f64 {
        match self {
            Self::Empty => 0.0,
            Self::Text => 0.5,
            _ => 1.0,
        }
    }
}

/// Pick a split for `sample` without examples.
///
/// Every punctuation or whitespace character seen in the sample is scored by
/// `coverage * mean column quality`, where coverage is the share of values that
/// split into the most common number of parts and a column's quality is the
/// share of values agreeing with its dominant character class (typed classes
/// weigh 1, free text 0.5). When no delimiter splits anything, fixed widths
/// at character-class boundaries are tried.
///
/// # Errors
///
/// `InferenceAmbiguous` when the sample is empty or has no usable structure.
pub fn detect_split(sample: &[String], settings: &EngineSettings) -> Result<SplitProgram> {
    let values: Vec<&str> = sample
        .iter()
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .collect();
    if values.is_empty() {
        return Err(WrangleError::InferenceAmbiguous(
            "no non-empty values to split".to_owned(),
        ));
    }

    let mut candidates: Vec<char> = Vec::new();
    for c in values
        .iter()
        .flat_map(|v| v.chars())
        .filter(|c| !c.is_alphanumeric())
    {
        if !candidates.contains(&c) {
            candidates.push(c);
        }
    }
    candidates.sort_by_key(|c| {
        PREFERRED_DELIMITERS
            .iter()
            .position(|p| p == c)
            .map_or((1, u32::from(*c)), |pos| (0, pos as u32))
    });

    let mut best: Option<(f64, SplitProgram)> = None;
    for delimiter in candidates {
        let Some((score, columns)) = score_delimiter(&values, delimiter, settings) else {
            continue;
        };
        tracing::debug!(?delimiter, score, columns, "Scored split delimiter");
        if best.as_ref().is_none_or(|(b, _)| score > *b) {
            best = Some((
                score,
                SplitProgram::Delimiter {
                    delimiter: delimiter.to_string(),
                    columns,
                },
            ));
        }
    }

    if let Some((_, program)) = best {
        return Ok(program);
    }

    fixed_width_by_class(&values).ok_or_else(|| {
        WrangleError::InferenceAmbiguous(
            "values share no delimiter or fixed-width structure".to_owned(),
        )
    })
}

fn score_delimiter(
    values: &[&str],
    delimiter: char,
    settings: &EngineSettings,
) -> Option<(f64, usize)> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v.split(delimiter).count()).or_default() += 1;
    }
    // Most common part count; ties go to fewer parts
    let (&columns, &covered) = counts
        .iter()
        .filter(|&(&parts, _)| parts >= 2)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))?;

    let mut classes: Vec<BTreeMap<PartClass, usize>> = vec![BTreeMap::new(); columns];
    for v in values {
        let mut parts = v.splitn(columns, delimiter);
        for column in &mut classes {
            let class = parts
                .next()
                .map_or(PartClass::Empty, |p| PartClass::of(p, settings));
            *column.entry(class).or_default() += 1;
        }
    }

    let total = values.len() as f64;
    let quality: f64 = classes
        .iter()
        .map(|column| {
            column
                .iter()
                .filter(|&(&class, _)| class != PartClass::Empty)
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map_or(0.0, |(class, &n)| n as f64 / total * class.weight())
        })
        .sum::<f64>()
        / columns as f64;

    let coverage = covered as f64 / total;
    Some((coverage * quality, columns))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Digit,
    Alpha,
    Other,
}

fn char_class(c: char) -> CharClass {
    if c.is_numeric() {
        CharClass::Digit
    } else if c.is_alphabetic() {
        CharClass::Alpha
    } else {
        CharClass::Other
    }
}

fn class_runs(value: &str) -> Vec<usize> {
    let mut runs: Vec<(CharClass, usize)> = Vec::new();
    for c in value.chars() {
        let class = char_class(c);
        match runs.last_mut() {
            Some((last, len)) if *last == class => *len += 1,
            _ => runs.push((class, 1)),
        }
    }
    runs.into_iter().map(|(_, len)| len).collect()
}

// Run widths shared by at least half the values.
fn fixed_width_by_class(values: &[&str]) -> Option<SplitProgram> {
    let mut layouts: BTreeMap<Vec<usize>, usize> = BTreeMap::new();
    for v in values {
        *layouts.entry(class_runs(v)).or_default() += 1;
    }
    let (widths, count) = layouts
        .into_iter()
        .filter(|(w, _)| w.len() >= 2)
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.len().cmp(&a.0.len())))?;
    (count * 2 >= values.len()).then_some(SplitProgram::FixedWidth { widths })
}

/// Names for `count` new columns split from `source`: `<source>_1`,
/// `<source>_2`, ... with the index window shifted upward until no name
/// collides with an existing column.
pub fn split_column_names(schema: &Schema, source: &str, count: usize) -> Vec<String> {
    let mut offset = 0;
    loop {
        let names: Vec<String> = (1..=count)
            .map(|i| format!("{source}_{}", i + offset))
            .collect();
        if names.iter().all(|n| !schema.contains(n)) {
            return names;
        }
        offset += 1;
    }
}
