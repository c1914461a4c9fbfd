//! Column selectors resolved against the live schema at execution time.
//!
//! A selector is stored unresolved inside a step. Patterns are compiled and
//! matched every time the step is materialized, so the same step applied to a
//! schema that later gains or loses columns selects accordingly.

use crate::error::{Result, WrangleError};
use crate::record::Schema;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// Explicit column names or a pattern over column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSelector {
    /// Every column of the schema
    All,

    /// Exact names; each must exist when the step runs
    Names { names: Vec<String> },

    /// Regular expression over column names; may match nothing
    Pattern {
        pattern: String,
        #[serde(default)]
        ignore_case: bool,
        #[serde(default)]
        match_whole: bool,
        #[serde(default)]
        invert: bool,
    },
}

impl ColumnSelector {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            ignore_case: false,
            match_whole: false,
            invert: false,
        }
    }

    /// Construction-time check: names must be non-empty and patterns must compile.
    ///
    /// # Errors
    ///
    /// `InvalidStep` for an empty name list or name, or a pattern that does
    /// not compile.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::All => Ok(()),
            Self::Names { names } => {
                if names.is_empty() {
                    return Err(WrangleError::InvalidStep(
                        "column selector lists no columns".to_owned(),
                    ));
                }
                if names.iter().any(String::is_empty) {
                    return Err(WrangleError::InvalidStep(
                        "column selector contains an empty name".to_owned(),
                    ));
                }
                Ok(())
            }
            Self::Pattern { .. } => self.compile().map(|_| ()),
        }
    }

    /// Resolve to column indices.
    ///
    /// `Names` keeps the caller's order (deduplicated) and fails with
    /// `ColumnNotFound` for an absent name; `Pattern` and `All` follow schema
    /// order.
    ///
    /// # Errors
    ///
    /// `ColumnNotFound` for a listed name absent from `schema`.
    pub fn resolve(&self, schema: &Schema) -> Result<Vec<usize>> {
        match self {
            Self::All => Ok((0..schema.len()).collect()),
            Self::Names { names } => {
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    let idx = schema.require(name)?;
                    if !indices.contains(&idx) {
                        indices.push(idx);
                    }
                }
                Ok(indices)
            }
            Self::Pattern { invert, .. } => {
                let regex = self.compile()?;
                Ok(schema
                    .names()
                    .enumerate()
                    .filter(|(_, name)| regex.is_match(name) != *invert)
                    .map(|(i, _)| i)
                    .collect())
            }
        }
    }

    fn compile(&self) -> Result<regex::Regex> {
        let Self::Pattern {
            pattern,
            ignore_case,
            match_whole,
            ..
        } = self
        else {
            return Err(WrangleError::Other("not a pattern selector".to_owned()));
        };
        let source = if *match_whole {
            format!("^(?:{pattern})$")
        } else {
            pattern.clone()
        };
        Ok(RegexBuilder::new(&source)
            .case_insensitive(*ignore_case)
            .build()?)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::All => "all columns".to_owned(),
            Self::Names { names } => names.join(", "),
            Self::Pattern { pattern, .. } => format!("columns matching /{pattern}/"),
        }
    }
}

impl From<&str> for ColumnSelector {
    fn from(name: &str) -> Self {
        Self::names([name])
    }
}

impl From<String> for ColumnSelector {
    fn from(name: String) -> Self {
        Self::names([name])
    }
}

impl From<Vec<&str>> for ColumnSelector {
    fn from(names: Vec<&str>) -> Self {
        Self::names(names)
    }
}

impl From<Vec<String>> for ColumnSelector {
    fn from(names: Vec<String>) -> Self {
        Self::names(names)
    }
}

impl<const N: usize> From<[&str; N]> for ColumnSelector {
    fn from(names: [&str; N]) -> Self {
        Self::names(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxi_schema() -> Schema {
        Schema::from_names([
            "vendor",
            "pickup_datetime",
            "pickup_longitude",
            "dropoff_longitude",
            "distance",
        ])
        .unwrap()
    }

    #[test]
    fn test_names_keep_caller_order() {
        let selector = ColumnSelector::names(["distance", "vendor", "distance"]);
        assert_eq!(selector.resolve(&taxi_schema()).unwrap(), vec![4, 0]);
    }

    #[test]
    fn test_missing_name_fails_at_resolution() {
        let selector = ColumnSelector::from("tip_amount");
        assert!(selector.validate().is_ok());
        assert!(matches!(
            selector.resolve(&taxi_schema()),
            Err(WrangleError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_pattern_resolved_against_live_schema() {
        let selector = ColumnSelector::pattern("_longitude$");
        assert_eq!(selector.resolve(&taxi_schema()).unwrap(), vec![2, 3]);

        let other = Schema::from_names(["vendor"]).unwrap();
        assert!(selector.resolve(&other).unwrap().is_empty());
    }

    #[test]
    fn test_pattern_flags() {
        let selector = ColumnSelector::Pattern {
            pattern: "PICKUP.*".to_owned(),
            ignore_case: true,
            match_whole: true,
            invert: true,
        };
        assert_eq!(selector.resolve(&taxi_schema()).unwrap(), vec![0, 3, 4]);
    }

    #[test]
    fn test_invalid_pattern_rejected_at_construction() {
        assert!(matches!(
            ColumnSelector::pattern("(unclosed").validate(),
            Err(WrangleError::InvalidStep(_))
        ));
        assert!(ColumnSelector::names(Vec::<String>::new()).validate().is_err());
    }
}
