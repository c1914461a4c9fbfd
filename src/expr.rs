//! Predicate expressions for `filter`.
//!
//! Expressions are built with [`col`] and [`lit`] and combined with
//! comparison and logical methods:
//!
//! ```
//! use wrangle::expr::{all_of, col};
//!
//! let in_nyc = all_of([
//!     col("pickup_longitude").lt_eq(-73.72),
//!     col("pickup_longitude").gt_eq(-74.09),
//!     col("pickup_latitude").lt_eq(40.88),
//!     col("pickup_latitude").gt_eq(40.53),
//! ]);
//! assert!(in_nyc.validate_predicate().is_ok());
//! ```
//!
//! Evaluation is three-valued: comparisons involving a null (or values that
//! cannot be compared) are unknown, and `filter` keeps a row only when its
//! predicate is definitely true.

use crate::error::{Result, WrangleError};
use crate::record::{ColumnType, DateFormats, Row, Schema, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn test(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Expression tree over column references and literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Column {
        name: String,
    },
    Literal {
        value: Value,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And {
        operands: Vec<Expr>,
    },
    Or {
        operands: Vec<Expr>,
    },
    Not {
        operand: Box<Expr>,
    },
    IsNull {
        operand: Box<Expr>,
    },
    Contains {
        operand: Box<Expr>,
        needle: String,
    },
}

/// Reference a column by name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column { name: name.into() }
}

/// A literal value.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal {
        value: value.into(),
    }
}

/// Conjunction of all given predicates.
pub fn all_of(operands: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::And {
        operands: operands.into_iter().collect(),
    }
}

/// Disjunction of all given predicates.
pub fn any_of(operands: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Or {
        operands: operands.into_iter().collect(),
    }
}

impl Expr {
    fn compare(self, op: CompareOp, other: impl Into<Self>) -> Self {
        Self::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Self>) -> Self {
        self.compare(CompareOp::Eq, other)
    }

    pub fn neq(self, other: impl Into<Self>) -> Self {
        self.compare(CompareOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Self>) -> Self {
        self.compare(CompareOp::Lt, other)
    }

    pub fn lt_eq(self, other: impl Into<Self>) -> Self {
        self.compare(CompareOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Self>) -> Self {
        self.compare(CompareOp::Gt, other)
    }

    pub fn gt_eq(self, other: impl Into<Self>) -> Self {
        self.compare(CompareOp::Ge, other)
    }

    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And { mut operands } => {
                operands.push(other);
                Self::And { operands }
            }
            first => all_of([first, other]),
        }
    }

    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or { mut operands } => {
                operands.push(other);
                Self::Or { operands }
            }
            first => any_of([first, other]),
        }
    }

    pub fn is_null(self) -> Self {
        Self::IsNull {
            operand: Box::new(self),
        }
    }

    pub fn is_not_null(self) -> Self {
        !self.is_null()
    }

    pub fn contains(self, needle: impl Into<String>) -> Self {
        Self::Contains {
            operand: Box::new(self),
            needle: needle.into(),
        }
    }

    fn is_value(&self) -> bool {
        matches!(self, Self::Column { .. } | Self::Literal { .. })
    }

    fn is_boolean(&self) -> bool {
        match self {
            Self::Column { .. } => true,
            Self::Literal { value } => matches!(value, Value::Bool(_)),
            _ => true,
        }
    }

    /// Construction-time check that this expression is a well-formed predicate.
    ///
    /// # Errors
    ///
    /// `InvalidStep` when the expression is not boolean or a comparison does
    /// not compare columns or literals.
    pub fn validate_predicate(&self) -> Result<()> {
        if !self.is_boolean() {
            return Err(WrangleError::InvalidStep(format!(
                "filter expression '{self}' is not a boolean predicate"
            )));
        }
        self.validate_node()
    }

    fn validate_node(&self) -> Result<()> {
        let invalid = |msg: String| Err(WrangleError::InvalidStep(msg));
        match self {
            Self::Column { name } if name.is_empty() => {
                invalid("column reference with empty name".to_owned())
            }
            Self::Column { .. } | Self::Literal { .. } => Ok(()),
            Self::Compare { left, right, .. } => {
                if !left.is_value() || !right.is_value() {
                    return invalid(format!(
                        "comparison '{self}' must compare columns or literals"
                    ));
                }
                left.validate_node()?;
                right.validate_node()
            }
            Self::And { operands } | Self::Or { operands } => {
                if operands.is_empty() {
                    return invalid("logical combination without operands".to_owned());
                }
                for operand in operands {
                    operand.validate_predicate()?;
                }
                Ok(())
            }
            Self::Not { operand } => operand.validate_predicate(),
            Self::IsNull { operand } | Self::Contains { operand, .. } => {
                if !operand.is_value() {
                    return invalid(format!("'{self}' must test a column or literal"));
                }
                operand.validate_node()
            }
        }
    }

    /// Columns referenced anywhere in the expression.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Column { name } => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Literal { .. } => {}
            Self::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::And { operands } | Self::Or { operands } => {
                for operand in operands {
                    operand.collect_columns(out);
                }
            }
            Self::Not { operand } | Self::IsNull { operand } | Self::Contains { operand, .. } => {
                operand.collect_columns(out);
            }
        }
    }

    /// Resolve column references against `schema`.
    ///
    /// # Errors
    ///
    /// `ColumnNotFound` for a referenced column missing from `schema`.
    pub fn bind(&self, schema: &Schema) -> Result<BoundExpr> {
        Ok(match self {
            Self::Column { name } => BoundExpr::Column(schema.require(name)?),
            Self::Literal { value } => BoundExpr::Literal(value.clone()),
            Self::Compare { op, left, right } => BoundExpr::Compare {
                op: *op,
                left: Box::new(left.bind(schema)?),
                right: Box::new(right.bind(schema)?),
            },
            Self::And { operands } => BoundExpr::And(
                operands
                    .iter()
                    .map(|e| e.bind(schema))
                    .collect::<Result<_>>()?,
            ),
            Self::Or { operands } => BoundExpr::Or(
                operands
                    .iter()
                    .map(|e| e.bind(schema))
                    .collect::<Result<_>>()?,
            ),
            Self::Not { operand } => BoundExpr::Not(Box::new(operand.bind(schema)?)),
            Self::IsNull { operand } => BoundExpr::IsNull(Box::new(operand.bind(schema)?)),
            Self::Contains { operand, needle } => BoundExpr::Contains {
                operand: Box::new(operand.bind(schema)?),
                needle: needle.clone(),
            },
        })
    }
}

impl std::ops::Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not {
            operand: Box::new(self),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, operands: &[Self], sep: &str| {
            write!(f, "(")?;
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{operand}")?;
            }
            write!(f, ")")
        };
        match self {
            Self::Column { name } => write!(f, "{name}"),
            Self::Literal {
                value: Value::Text(s),
            } => write!(f, "'{s}'"),
            Self::Literal { value } => write!(f, "{value}"),
            Self::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::And { operands } => join(f, operands, "AND"),
            Self::Or { operands } => join(f, operands, "OR"),
            Self::Not { operand } => write!(f, "NOT {operand}"),
            Self::IsNull { operand } => write!(f, "{operand} IS NULL"),
            Self::Contains { operand, needle } => write!(f, "{operand} CONTAINS '{needle}'"),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        lit(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        lit(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        lit(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        lit(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        lit(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        lit(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        lit(value)
    }
}

/// Expression with column references resolved to row positions.
#[derive(Debug, Clone)]
pub enum BoundExpr {
    Column(usize),
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    And(Vec<BoundExpr>),
    Or(Vec<BoundExpr>),
    Not(Box<BoundExpr>),
    IsNull(Box<BoundExpr>),
    Contains {
        operand: Box<BoundExpr>,
        needle: String,
    },
}

impl BoundExpr {
    fn value<'r>(&'r self, row: &'r Row, formats: &DateFormats<'_>) -> Cow<'r, Value> {
        match self {
            Self::Column(idx) => row.get(*idx).map_or(Cow::Owned(Value::Null), Cow::Borrowed),
            Self::Literal(value) => Cow::Borrowed(value),
            other => Cow::Owned(other.eval(row, formats).map_or(Value::Null, Value::Bool)),
        }
    }

    /// Three-valued evaluation; `None` means unknown.
    pub fn eval(&self, row: &Row, formats: &DateFormats<'_>) -> Option<bool> {
        match self {
            Self::Column(_) | Self::Literal(_) => match self.value(row, formats).as_ref() {
                Value::Bool(b) => Some(*b),
                _ => None,
            },
            Self::Compare { op, left, right } => {
                let l = left.value(row, formats);
                let r = right.value(row, formats);
                compare_values(&l, &r, formats).map(|ord| op.test(ord))
            }
            Self::And(operands) => {
                let mut unknown = false;
                for operand in operands {
                    match operand.eval(row, formats) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Self::Or(operands) => {
                let mut unknown = false;
                for operand in operands {
                    match operand.eval(row, formats) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
            Self::Not(operand) => operand.eval(row, formats).map(|b| !b),
            Self::IsNull(operand) => Some(operand.value(row, formats).is_null()),
            Self::Contains { operand, needle } => {
                let value = operand.value(row, formats);
                (!value.is_null()).then(|| value.render().contains(needle.as_str()))
            }
        }
    }
}

// Text meeting a typed value is converted to that type first; numbers are
// compared as decimals so "2.5" still meets an integer literal.
fn compare_values(l: &Value, r: &Value, formats: &DateFormats<'_>) -> Option<Ordering> {
    match (l, r) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Text(_), Value::Text(_)) => l.compare(r),
        (Value::Text(_), typed) => {
            let converted = l.convert(coercion_target(typed)?, formats)?;
            converted.compare(typed)
        }
        (typed, Value::Text(_)) => {
            let converted = r.convert(coercion_target(typed)?, formats)?;
            typed.compare(&converted)
        }
        _ => l.compare(r),
    }
}

fn coercion_target(typed: &Value) -> Option<ColumnType> {
    match typed.column_type()? {
        ColumnType::Integer => Some(ColumnType::Decimal),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expr, schema: &Schema, row: &Row) -> Option<bool> {
        let formats = DateFormats::new(&[], &[]);
        expr.bind(schema).unwrap().eval(row, &formats)
    }

    #[test]
    fn test_three_valued_logic() {
        let schema = Schema::from_names(["a", "b"]).unwrap();
        let row = vec![Value::Int(5), Value::Null];

        assert_eq!(eval(&col("a").gt(3), &schema, &row), Some(true));
        assert_eq!(eval(&col("b").gt(3), &schema, &row), None);
        assert_eq!(eval(&col("a").gt(3).and(col("b").gt(3)), &schema, &row), None);
        assert_eq!(eval(&col("a").lt(3).and(col("b").gt(3)), &schema, &row), Some(false));
        assert_eq!(eval(&col("a").gt(3).or(col("b").gt(3)), &schema, &row), Some(true));
        assert_eq!(eval(&col("b").is_null(), &schema, &row), Some(true));
        assert_eq!(eval(&!col("b").gt(3), &schema, &row), None);
    }

    #[test]
    fn test_text_coerced_to_literal_type() {
        let schema = Schema::from_names(["lon"]).unwrap();
        let row = vec![Value::from("-73.95")];
        assert_eq!(eval(&col("lon").lt_eq(-73.72), &schema, &row), Some(true));

        let junk = vec![Value::from("n/a")];
        assert_eq!(eval(&col("lon").lt_eq(-73.72), &schema, &junk), None);
    }

    #[test]
    fn test_fractional_text_meets_integer_literal() {
        let schema = Schema::from_names(["distance"]).unwrap();
        let keep = |text: &str| eval(&col("distance").gt(0), &schema, &vec![Value::from(text)]);

        assert_eq!(keep("2.5"), Some(true));
        assert_eq!(keep("3"), Some(true));
        assert_eq!(keep("0"), Some(false));
        assert_eq!(keep(".00"), Some(false));
        assert_eq!(keep("abc"), None);
    }

    #[test]
    fn test_validate_predicate() {
        assert!(col("a").gt(1).validate_predicate().is_ok());
        assert!(lit(3).validate_predicate().is_err());
        assert!(all_of([]).validate_predicate().is_err());
        assert!(
            col("a")
                .gt(1)
                .eq(true)
                .validate_predicate()
                .is_err()
        );
        assert!(all_of([col("a").gt(1), lit("x")]).validate_predicate().is_err());
    }

    #[test]
    fn test_bind_reports_missing_column() {
        let schema = Schema::from_names(["a"]).unwrap();
        let err = col("missing").is_null().bind(&schema).unwrap_err();
        assert!(matches!(err, WrangleError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_display() {
        let expr = col("distance").gt(0).and(col("vendor").eq("VTS"));
        assert_eq!(expr.to_string(), "(distance > 0 AND vendor == 'VTS')");
        assert_eq!(expr.columns(), vec!["distance", "vendor"]);
    }
}
