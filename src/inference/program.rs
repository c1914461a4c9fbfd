//! Replayable string transformation programs.
//!
//! Programs are plain data so that an inferred program can be persisted and
//! replayed later without searching again.

use crate::error::{Result, WrangleError};
use crate::record::Value;
use chrono::{Datelike as _, NaiveDate, NaiveDateTime, Timelike as _};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A component rendered from a parsed date or datetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateComponent {
    Year,
    Month,
    MonthPadded,
    Day,
    DayPadded,
    MonthName,
    MonthAbbrev,
    WeekdayName,
    WeekdayAbbrev,
    Quarter,
    Date,
    Time,
    Hour,
    Minute,
    Second,
}

impl DateComponent {
    pub const ALL: [Self; 15] = [
        Self::Year,
        Self::Month,
        Self::MonthPadded,
        Self::Day,
        Self::DayPadded,
        Self::MonthName,
        Self::MonthAbbrev,
        Self::WeekdayName,
        Self::WeekdayAbbrev,
        Self::Quarter,
        Self::Date,
        Self::Time,
        Self::Hour,
        Self::Minute,
        Self::Second,
    ];

    fn needs_time(self) -> bool {
        matches!(self, Self::Time | Self::Hour | Self::Minute | Self::Second)
    }

    /// Render this component. Time components need a time-bearing input.
    fn render(self, value: NaiveDateTime, has_time: bool) -> Option<String> {
        if self.needs_time() && !has_time {
            return None;
        }
        let pattern = match self {
            Self::Year => "%Y",
            Self::Month => "%-m",
            Self::MonthPadded => "%m",
            Self::Day => "%-d",
            Self::DayPadded => "%d",
            Self::MonthName => "%B",
            Self::MonthAbbrev => "%b",
            Self::WeekdayName => "%A",
            Self::WeekdayAbbrev => "%a",
            Self::Quarter => return Some(((value.month() - 1) / 3 + 1).to_string()),
            Self::Date => "%Y-%m-%d",
            Self::Time => "%H:%M:%S",
            Self::Hour => return Some(format!("{:02}", value.hour())),
            Self::Minute => "%M",
            Self::Second => "%S",
        };
        Some(value.format(pattern).to_string())
    }
}

/// Pulls a piece out of an input string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extractor {
    /// The input unchanged
    Whole,

    /// Field `index` after splitting on `delimiter`; negative counts from the end
    SplitPart { delimiter: String, index: i32 },

    /// `len` characters from character offset `start`; `None` takes the rest
    Slice { start: usize, len: Option<usize> },

    /// A component of the input parsed with a chrono `format`
    DatePart {
        format: String,
        part: DateComponent,
    },
}

impl Extractor {
    pub fn apply(&self, input: &str) -> Option<String> {
        match self {
            Self::Whole => Some(input.to_owned()),
            Self::SplitPart { delimiter, index } => {
                let parts: Vec<&str> = input.split(delimiter.as_str()).collect();
                if parts.len() < 2 {
                    return None;
                }
                let idx = if *index < 0 {
                    parts.len().checked_sub(index.unsigned_abs() as usize)?
                } else {
                    *index as usize
                };
                parts.get(idx).map(|p| (*p).to_owned())
            }
            Self::Slice { start, len } => {
                let count = input.chars().count();
                if *start >= count {
                    return None;
                }
                match len {
                    Some(len) if start + len > count => None,
                    Some(len) => Some(input.chars().skip(*start).take(*len).collect()),
                    None => Some(input.chars().skip(*start).collect()),
                }
            }
            Self::DatePart { format, part } => {
                let (value, has_time) = parse_temporal(input.trim(), format)?;
                part.render(value, has_time)
            }
        }
    }

    /// Search cost; cheaper extractors are preferred on ties.
    pub fn cost(&self) -> u32 {
        match self {
            Self::Whole => 1,
            Self::SplitPart { .. } | Self::DatePart { .. } => 2,
            Self::Slice { .. } => 4,
        }
    }
}

impl fmt::Display for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => write!(f, "value"),
            Self::SplitPart { delimiter, index } => write!(f, "split('{delimiter}')[{index}]"),
            Self::Slice { start, len: Some(len) } => write!(f, "chars[{start}..{}]", start + len),
            Self::Slice { start, len: None } => write!(f, "chars[{start}..]"),
            Self::DatePart { format, part } => write!(f, "date('{format}').{part:?}"),
        }
    }
}

pub(crate) fn parse_temporal(input: &str, format: &str) -> Option<(NaiveDateTime, bool)> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
        return Some((dt, true));
    }
    NaiveDate::parse_from_str(input, format)
        .ok()
        .map(|d| (d.and_time(chrono::NaiveTime::MIN), false))
}

/// One piece of a derived value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "atom", rename_all = "snake_case")]
pub enum Atom {
    Const { text: String },
    Extract { extractor: Extractor },
}

impl Atom {
    pub fn cost(&self) -> u32 {
        match self {
            Self::Const { .. } => 2,
            Self::Extract { extractor } => extractor.cost(),
        }
    }
}

/// Concatenation of atoms producing one output string from one input string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeriveProgram {
    pub atoms: Vec<Atom>,
}

impl DeriveProgram {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    pub fn extract(extractor: Extractor) -> Self {
        Self::new(vec![Atom::Extract { extractor }])
    }

    /// `None` when any extractor does not apply to `input`.
    pub fn apply(&self, input: &str) -> Option<String> {
        let mut out = String::new();
        for atom in &self.atoms {
            match atom {
                Atom::Const { text } => out.push_str(text),
                Atom::Extract { extractor } => out.push_str(&extractor.apply(input)?),
            }
        }
        Some(out)
    }

    /// Null in, null out; failed extraction gives null.
    pub fn apply_value(&self, input: &Value) -> Value {
        if input.is_null() {
            return Value::Null;
        }
        self.apply(&input.render()).map_or(Value::Null, Value::Text)
    }

    pub fn cost(&self) -> u32 {
        self.atoms.iter().map(Atom::cost).sum()
    }

    /// # Errors
    ///
    /// `InvalidStep` for a program that cannot run.
    pub fn validate(&self) -> Result<()> {
        for atom in &self.atoms {
            if let Atom::Extract { extractor } = atom {
                match extractor {
                    Extractor::SplitPart { delimiter, .. } if delimiter.is_empty() => {
                        return Err(WrangleError::InvalidStep(
                            "split extractor with empty delimiter".to_owned(),
                        ));
                    }
                    Extractor::Slice { len: Some(0), .. } => {
                        return Err(WrangleError::InvalidStep(
                            "slice extractor with zero length".to_owned(),
                        ));
                    }
                    Extractor::DatePart { format, .. } if format.is_empty() => {
                        return Err(WrangleError::InvalidStep(
                            "date extractor with empty format".to_owned(),
                        ));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for DeriveProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.atoms.is_empty() {
            return write!(f, "''");
        }
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            match atom {
                Atom::Const { text } => write!(f, "'{text}'")?,
                Atom::Extract { extractor } => write!(f, "{extractor}")?,
            }
        }
        Ok(())
    }
}

/// Turns one input value into a fixed number of output values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SplitProgram {
    /// At most `columns` parts; the last part keeps any further delimiters
    Delimiter { delimiter: String, columns: usize },

    /// Consecutive character widths; the last column takes the remainder
    FixedWidth { widths: Vec<usize> },

    /// One derivation per output column
    Derived { programs: Vec<DeriveProgram> },
}

impl SplitProgram {
    /// Number of output columns.
    pub fn width(&self) -> usize {
        match self {
            Self::Delimiter { columns, .. } => *columns,
            Self::FixedWidth { widths } => widths.len(),
            Self::Derived { programs } => programs.len(),
        }
    }

    /// Split one input; missing parts are null and a null input gives all nulls.
    pub fn apply(&self, input: Option<&str>) -> Vec<Value> {
        let width = self.width();
        let Some(input) = input else {
            return vec![Value::Null; width];
        };
        let mut out: Vec<Value> = match self {
            Self::Delimiter { delimiter, columns } => input
                .splitn(*columns, delimiter.as_str())
                .map(|part| Value::Text(part.to_owned()))
                .collect(),
            Self::FixedWidth { widths } => {
                let chars: Vec<char> = input.chars().collect();
                let mut offset = 0;
                let mut parts = Vec::with_capacity(widths.len());
                for (i, w) in widths.iter().enumerate() {
                    if offset >= chars.len() {
                        break;
                    }
                    let end = if i + 1 == widths.len() {
                        chars.len()
                    } else {
                        (offset + w).min(chars.len())
                    };
                    let piece = chars.get(offset..end).unwrap_or_default();
                    parts.push(Value::Text(piece.iter().collect()));
                    offset = end;
                }
                parts
            }
            Self::Derived { programs } => programs
                .iter()
                .map(|p| p.apply(input).map_or(Value::Null, Value::Text))
                .collect(),
        };
        out.resize(width, Value::Null);
        out
    }

    /// # Errors
    ///
    /// `InvalidStep` for a program that cannot run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(WrangleError::InvalidStep(msg.to_owned()));
        match self {
            Self::Delimiter { delimiter, .. } if delimiter.is_empty() => {
                invalid("split delimiter must not be empty")
            }
            Self::Delimiter { columns, .. } if *columns < 2 => {
                invalid("a delimiter split needs at least two output columns")
            }
            Self::FixedWidth { widths } if widths.len() < 2 || widths.contains(&0) => {
                invalid("fixed-width split needs at least two non-zero widths")
            }
            Self::Derived { programs } if programs.is_empty() => {
                invalid("derived split needs at least one output program")
            }
            Self::Derived { programs } => programs.iter().try_for_each(DeriveProgram::validate),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SplitProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delimiter { delimiter, columns } => {
                write!(f, "split on '{delimiter}' into {columns} columns")
            }
            Self::FixedWidth { widths } => write!(f, "fixed widths {widths:?}"),
            Self::Derived { programs } => {
                write!(f, "derive [")?;
                for (i, p) in programs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// An input value and the single output it should derive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeriveExample {
    pub input: String,
    pub output: String,
}

impl DeriveExample {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

impl<I: Into<String>, O: Into<String>> From<(I, O)> for DeriveExample {
    fn from((input, output): (I, O)) -> Self {
        Self::new(input, output)
    }
}

/// An input value and the values it should split into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitExample {
    pub input: String,
    pub outputs: Vec<String>,
}

impl SplitExample {
    pub fn new<I, S>(input: impl Into<String>, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: input.into(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }
}
