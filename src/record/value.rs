//! Scalar cell values and column types.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A nullable scalar cell.
///
/// Sources produce `Text` cells; typed variants appear after conversion steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

/// JSON has no NaN or infinities; those are written as the strings `"NaN"`,
/// `"inf"` and `"-inf"`.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub(super) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(t) => match t.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid float '{other}'"))),
            },
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ColumnType::Boolean),
            Self::Int(_) => Some(ColumnType::Integer),
            Self::Float(_) => Some(ColumnType::Decimal),
            Self::Date(_) => Some(ColumnType::Date),
            Self::DateTime(_) => Some(ColumnType::DateTime),
            Self::Text(_) => Some(ColumnType::String),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering used for output, string matching and split inputs.
    /// Null renders as the empty string.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Null => Cow::Borrowed(""),
            Self::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Self::Int(i) => Cow::Owned(i.to_string()),
            Self::Float(f) => Cow::Owned(f.to_string()),
            Self::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Self::Text(s) => Cow::Borrowed(s),
        }
    }

    /// Ordering between two non-null values, `None` when they are not
    /// comparable. Integers and decimals compare numerically, dates compare
    /// with datetimes at midnight.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::DateTime(b)) => Some(a.and_time(NaiveTime::MIN).cmp(b)),
            (Self::DateTime(a), Self::Date(b)) => Some(a.cmp(&b.and_time(NaiveTime::MIN))),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Whether this value is acceptable in a column declared as `dtype`.
    /// Nulls and `Unknown` columns accept anything.
    pub fn matches_type(&self, dtype: ColumnType) -> bool {
        match (self.column_type(), dtype) {
            (None, _) | (_, ColumnType::Unknown) => true,
            (Some(ColumnType::Integer), ColumnType::Decimal) => true,
            (Some(actual), expected) => actual == expected,
        }
    }

    /// Convert to `target`, returning `None` when the value does not parse.
    /// Null converts to null for every target.
    pub fn convert(&self, target: ColumnType, formats: &DateFormats<'_>) -> Option<Self> {
        use ColumnType as T;

        match (target, self) {
            (_, Self::Null) => Some(Self::Null),
            (T::Unknown, v) => Some(v.clone()),
            (T::String, v) => Some(Self::Text(v.render().into_owned())),

            (T::Boolean, Self::Bool(b)) => Some(Self::Bool(*b)),
            (T::Boolean, Self::Int(0)) => Some(Self::Bool(false)),
            (T::Boolean, Self::Int(1)) => Some(Self::Bool(true)),
            (T::Boolean, Self::Text(s)) => parse_bool(s, true).map(Self::Bool),

            (T::Integer, Self::Int(i)) => Some(Self::Int(*i)),
            (T::Integer, Self::Float(f)) => float_to_int(*f).map(Self::Int),
            (T::Integer, Self::Bool(b)) => Some(Self::Int(i64::from(*b))),
            (T::Integer, Self::Text(s)) => parse_int(s)
                .or_else(|| parse_decimal(s).and_then(float_to_int))
                .map(Self::Int),

            (T::Decimal, Self::Int(i)) => Some(Self::Float(*i as f64)),
            (T::Decimal, Self::Float(f)) => Some(Self::Float(*f)),
            (T::Decimal, Self::Text(s)) => parse_decimal(s).map(Self::Float),

            (T::Date, Self::Date(d)) => Some(Self::Date(*d)),
            (T::Date, Self::DateTime(dt)) => Some(Self::Date(dt.date())),
            (T::Date, Self::Text(s)) => formats.parse_date(s).map(Self::Date),

            (T::DateTime, Self::DateTime(dt)) => Some(Self::DateTime(*dt)),
            (T::DateTime, Self::Date(d)) => Some(Self::DateTime(d.and_time(NaiveTime::MIN))),
            (T::DateTime, Self::Text(s)) => formats.parse_datetime(s).map(Self::DateTime),

            _ => None,
        }
    }

    /// Key that identifies a value for distinct counting.
    pub(crate) fn distinct_key(&self) -> String {
        let tag = self.column_type().map_or("null", |t| t.as_str());
        format!("{tag}\u{1f}{}", self.render())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Declared type of a column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Not yet inferred; sources declare every column this way
    #[default]
    Unknown,
    Boolean,
    Integer,
    Decimal,
    Date,
    DateTime,
    String,
}

impl ColumnType {
    /// Candidate order used by type inference; `String` is the fallback.
    pub const INFERENCE_ORDER: [Self; 5] = [
        Self::Boolean,
        Self::Integer,
        Self::Decimal,
        Self::Date,
        Self::DateTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::String => "string",
        }
    }

    pub fn is_ordered(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Boolean)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = crate::error::WrangleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "boolean" | "bool" => Ok(Self::Boolean),
            "integer" | "int" | "i64" => Ok(Self::Integer),
            "decimal" | "float" | "f64" | "number" | "numeric" => Ok(Self::Decimal),
            "date" => Ok(Self::Date),
            "datetime" | "timestamp" => Ok(Self::DateTime),
            "string" | "text" | "str" => Ok(Self::String),
            other => Err(crate::error::WrangleError::InvalidStep(format!(
                "unknown column type '{other}'"
            ))),
        }
    }
}

/// Date and datetime patterns used when parsing text cells.
#[derive(Debug, Clone, Copy)]
pub struct DateFormats<'a> {
    pub explicit: Option<&'a str>,
    pub dates: &'a [String],
    pub datetimes: &'a [String],
}

impl<'a> DateFormats<'a> {
    pub fn new(dates: &'a [String], datetimes: &'a [String]) -> Self {
        Self {
            explicit: None,
            dates,
            datetimes,
        }
    }

    pub fn with_explicit(mut self, format: Option<&'a str>) -> Self {
        self.explicit = format;
        self
    }

    /// Parse a date; full datetimes are accepted and truncated.
    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if let Some(fmt) = self.explicit {
            return NaiveDate::parse_from_str(text, fmt)
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(text, fmt).ok().map(|dt| dt.date()));
        }
        self.dates
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            .or_else(|| {
                self.datetimes
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                    .map(|dt| dt.date())
            })
    }

    /// Parse a datetime; plain dates are accepted at midnight.
    pub fn parse_datetime(&self, text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        if let Some(fmt) = self.explicit {
            return NaiveDateTime::parse_from_str(text, fmt).ok().or_else(|| {
                NaiveDate::parse_from_str(text, fmt)
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            });
        }
        self.datetimes
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .or_else(|| {
                self.dates
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
    }
}

/// Parse a boolean token. Strict mode accepts only `true`/`false`.
pub fn parse_bool(text: &str, lenient: bool) -> Option<bool> {
    let lowered = text.trim().to_lowercase();
    match lowered.as_str() {
        "true" => Some(true),
        "false" => Some(false),
        "yes" | "y" | "t" | "1" if lenient => Some(true),
        "no" | "n" | "f" | "0" if lenient => Some(false),
        _ => None,
    }
}

pub fn parse_int(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// Parse a finite decimal; accepts forms such as `.00` and `3.`.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    // f64::from_str also accepts "inf" and "NaN"
    if trimmed.chars().any(char::is_alphabetic) && !trimmed.contains(['e', 'E']) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn float_to_int(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_json_keeps_bits_and_non_finite() {
        let values = vec![
            Value::Float(1.0 / 7.0 * 1.1),
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(f64::NAN),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert!(json.contains("\"NaN\""));

        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        let bits: Vec<u64> = back
            .iter()
            .map(|v| match v {
                Value::Float(f) => f.to_bits(),
                other => panic!("expected float, got {other:?}"),
            })
            .collect();
        assert_eq!(bits[0], (1.0_f64 / 7.0 * 1.1).to_bits());
        assert_eq!(bits[1], f64::INFINITY.to_bits());
        assert_eq!(bits[2], f64::NEG_INFINITY.to_bits());
        assert!(f64::from_bits(bits[3]).is_nan());
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }

    fn formats() -> (Vec<String>, Vec<String>) {
        (
            vec!["%Y-%m-%d".to_owned(), "%m/%d/%Y".to_owned()],
            vec!["%Y-%m-%d %H:%M:%S".to_owned()],
        )
    }

    #[test]
    fn test_render_and_compare() {
        assert_eq!(Value::Float(0.0).render(), "0");
        assert_eq!(Value::Float(3.5).render(), "3.5");
        assert_eq!(Value::Null.render(), "");
        assert_eq!(
            Value::Int(2).compare(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Text("a".into()).compare(&Value::Int(1)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_parse_decimal_edge_cases() {
        assert_eq!(parse_decimal(".00"), Some(0.0));
        assert_eq!(parse_decimal(" 3.5 "), Some(3.5));
        assert_eq!(parse_decimal("1e3"), Some(1000.0));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal("12abc"), None);
    }

    #[test]
    fn test_convert_text_to_types() {
        let (dates, datetimes) = formats();
        let fmts = DateFormats::new(&dates, &datetimes);

        assert_eq!(
            Value::from("42").convert(ColumnType::Integer, &fmts),
            Some(Value::Int(42))
        );
        assert_eq!(
            Value::from("4.0").convert(ColumnType::Integer, &fmts),
            Some(Value::Int(4))
        );
        assert_eq!(Value::from("4.5").convert(ColumnType::Integer, &fmts), None);
        assert_eq!(
            Value::from("yes").convert(ColumnType::Boolean, &fmts),
            Some(Value::Bool(true))
        );
        assert_eq!(
            Value::from("01/04/2009").convert(ColumnType::Date, &fmts),
            NaiveDate::from_ymd_opt(2009, 1, 4).map(Value::Date)
        );
        assert_eq!(
            Value::from("2013-08-22 10:00:00")
                .convert(ColumnType::Date, &fmts)
                .map(|v| v.render().into_owned()),
            Some("2013-08-22".to_owned())
        );
        assert_eq!(
            Value::Null.convert(ColumnType::Decimal, &fmts),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_column_type_from_str() {
        assert_eq!("float".parse::<ColumnType>().ok(), Some(ColumnType::Decimal));
        assert_eq!("DateTime".parse::<ColumnType>().ok(), Some(ColumnType::DateTime));
        assert!("complex".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_strict_bool_rejects_digits() {
        assert_eq!(parse_bool("1", false), None);
        assert_eq!(parse_bool("TRUE", false), Some(true));
        assert_eq!(parse_bool("1", true), Some(true));
    }
}
