//! Per-kind comparison functions used by query leaves.
//!
//! Equality is numeric-aware (`1 == 1.0`). Ordering comparators only apply
//! to numbers and to date / datetime strings; any other pairing is simply not
//! a match, so a numeric bound never matches a string field.

use crate::error::{Result, StubDbError};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    Equals(Value),
    NotEquals(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value),
    NotBetween(Value, Value),
    Contains(Value),
    NotContains(Value),
    StartsWith(String),
    EndsWith(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
}

/// Comparator names accepted in JSON query shapes.
pub const COMPARATOR_NAMES: &[&str] = &[
    "equals",
    "notEquals",
    "gt",
    "gte",
    "lt",
    "lte",
    "between",
    "notBetween",
    "contains",
    "notContains",
    "startsWith",
    "endsWith",
    "in",
    "notIn",
];

pub fn equals(value: impl Into<Value>) -> Comparator {
    Comparator::Equals(value.into())
}

pub fn not_equals(value: impl Into<Value>) -> Comparator {
    Comparator::NotEquals(value.into())
}

pub fn gt(value: impl Into<Value>) -> Comparator {
    Comparator::Gt(value.into())
}

pub fn gte(value: impl Into<Value>) -> Comparator {
    Comparator::Gte(value.into())
}

pub fn lt(value: impl Into<Value>) -> Comparator {
    Comparator::Lt(value.into())
}

pub fn lte(value: impl Into<Value>) -> Comparator {
    Comparator::Lte(value.into())
}

pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Comparator {
    Comparator::Between(low.into(), high.into())
}

pub fn not_between(low: impl Into<Value>, high: impl Into<Value>) -> Comparator {
    Comparator::NotBetween(low.into(), high.into())
}

pub fn contains(value: impl Into<Value>) -> Comparator {
    Comparator::Contains(value.into())
}

pub fn not_contains(value: impl Into<Value>) -> Comparator {
    Comparator::NotContains(value.into())
}

pub fn starts_with(prefix: impl Into<String>) -> Comparator {
    Comparator::StartsWith(prefix.into())
}

pub fn ends_with(suffix: impl Into<String>) -> Comparator {
    Comparator::EndsWith(suffix.into())
}

pub fn one_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Comparator {
    Comparator::In(values.into_iter().map(Into::into).collect())
}

pub fn none_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Comparator {
    Comparator::NotIn(values.into_iter().map(Into::into).collect())
}

impl Comparator {
    /// Evaluate against a field value. Missing fields are passed as `Null`.
    pub fn test(&self, actual: &Value) -> bool {
        match self {
            Comparator::Equals(expected) => values_equal(actual, expected),
            Comparator::NotEquals(expected) => !values_equal(actual, expected),
            Comparator::Gt(bound) => compare(actual, bound) == Some(Ordering::Greater),
            Comparator::Gte(bound) => {
                matches!(compare(actual, bound), Some(Ordering::Greater | Ordering::Equal))
            }
            Comparator::Lt(bound) => compare(actual, bound) == Some(Ordering::Less),
            Comparator::Lte(bound) => {
                matches!(compare(actual, bound), Some(Ordering::Less | Ordering::Equal))
            }
            Comparator::Between(low, high) => in_range(actual, low, high) == Some(true),
            Comparator::NotBetween(low, high) => in_range(actual, low, high) == Some(false),
            Comparator::Contains(needle) => contains_value(actual, needle) == Some(true),
            Comparator::NotContains(needle) => contains_value(actual, needle) == Some(false),
            Comparator::StartsWith(prefix) => {
                actual.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            Comparator::EndsWith(suffix) => {
                actual.as_str().is_some_and(|s| s.ends_with(suffix.as_str()))
            }
            Comparator::In(options) => options.iter().any(|o| values_equal(actual, o)),
            Comparator::NotIn(options) => !options.iter().any(|o| values_equal(actual, o)),
        }
    }

    /// Parse one `name: argument` entry of a JSON comparator object.
    pub fn from_json(name: &str, argument: &Value) -> Result<Self> {
        let pair = |name: &str| -> Result<(Value, Value)> {
            match argument.as_array().map(Vec::as_slice) {
                Some([low, high]) => Ok((low.clone(), high.clone())),
                _ => Err(StubDbError::Query(format!(
                    "Comparator '{name}' expects a [low, high] pair, got {argument}"
                ))),
            }
        };
        let list = |name: &str| -> Result<Vec<Value>> {
            argument.as_array().cloned().ok_or_else(|| {
                StubDbError::Query(format!(
                    "Comparator '{name}' expects a list, got {argument}"
                ))
            })
        };
        let text = |name: &str| -> Result<String> {
            argument.as_str().map(str::to_string).ok_or_else(|| {
                StubDbError::Query(format!(
                    "Comparator '{name}' expects a string, got {argument}"
                ))
            })
        };

        Ok(match name {
            "equals" => Comparator::Equals(argument.clone()),
            "notEquals" => Comparator::NotEquals(argument.clone()),
            "gt" => Comparator::Gt(argument.clone()),
            "gte" => Comparator::Gte(argument.clone()),
            "lt" => Comparator::Lt(argument.clone()),
            "lte" => Comparator::Lte(argument.clone()),
            "between" => {
                let (low, high) = pair(name)?;
                Comparator::Between(low, high)
            }
            "notBetween" => {
                let (low, high) = pair(name)?;
                Comparator::NotBetween(low, high)
            }
            "contains" => Comparator::Contains(argument.clone()),
            "notContains" => Comparator::NotContains(argument.clone()),
            "startsWith" => Comparator::StartsWith(text(name)?),
            "endsWith" => Comparator::EndsWith(text(name)?),
            "in" => Comparator::In(list(name)?),
            "notIn" => Comparator::NotIn(list(name)?),
            other => {
                return Err(StubDbError::Query(format!("Unknown comparator '{other}'")));
            }
        })
    }
}

/// Numeric-aware structural equality.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering between two values of an orderable kind (numbers, dates).
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(parse_date(x)?.cmp(&parse_date(y)?)),
        _ => None,
    }
}

/// Total order used for sorting: missing / null first, then booleans,
/// numbers, strings (date strings chronologically), arrays, objects.
pub(crate) fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) => compare(a, b).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => compare(a, b).unwrap_or_else(|| x.cmp(y)),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn in_range(actual: &Value, low: &Value, high: &Value) -> Option<bool> {
    let above_low = compare(actual, low)? != Ordering::Less;
    let below_high = compare(actual, high)? != Ordering::Greater;
    Some(above_low && below_high)
}

/// `None` when containment does not apply to the value's kind.
fn contains_value(actual: &Value, needle: &Value) -> Option<bool> {
    match (actual, needle) {
        (Value::String(haystack), Value::String(needle)) => Some(haystack.contains(needle.as_str())),
        (Value::Array(items), needle) => Some(items.iter().any(|item| values_equal(item, needle))),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_is_numeric_aware() {
        assert!(equals(1).test(&json!(1.0)));
        assert!(not_equals("a").test(&json!("b")));
        assert!(not_equals("a").test(&Value::Null));
        assert!(!equals(json!({"a": 1})).test(&json!({"a": 2})));
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(gt(5).test(&json!(6)));
        assert!(!gt(5).test(&json!(5)));
        assert!(gte(5).test(&json!(5)));
        assert!(lt(5.5).test(&json!(5)));
        assert!(lte(5).test(&json!(5)));
        assert!(between(1, 3).test(&json!(3)));
        assert!(not_between(1, 3).test(&json!(4)));
    }

    #[test]
    fn test_ordering_rejects_other_kinds() {
        assert!(!gt(5).test(&json!("6")));
        assert!(!lt("zebra").test(&json!("apple")));
        assert!(!not_between(1, 3).test(&json!("x")));
        assert!(!gt(1).test(&Value::Null));
    }

    #[test]
    fn test_date_ordering() {
        assert!(gt("2024-01-01").test(&json!("2024-06-01T12:00:00Z")));
        assert!(lt("2024-01-01T00:00:00+02:00").test(&json!("2023-12-31")));
        assert!(between("2024-01-01", "2024-12-31").test(&json!("2024-07-04")));
    }

    #[test]
    fn test_string_and_list_containment() {
        assert!(contains("lic").test(&json!("Alice")));
        assert!(not_contains("bob").test(&json!("Alice")));
        assert!(contains("rust").test(&json!(["go", "rust"])));
        assert!(!not_contains("x").test(&json!(42)));
        assert!(starts_with("Al").test(&json!("Alice")));
        assert!(ends_with("ce").test(&json!("Alice")));
        assert!(!starts_with("Al").test(&json!(1)));
    }

    #[test]
    fn test_membership() {
        assert!(one_of([1, 2, 3]).test(&json!(2)));
        assert!(none_of(["a", "b"]).test(&json!("c")));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Comparator::from_json("gt", &json!(3)).unwrap(), gt(3));
        assert_eq!(
            Comparator::from_json("between", &json!([1, 2])).unwrap(),
            between(1, 2)
        );
        assert!(Comparator::from_json("between", &json!(1)).is_err());
        assert!(Comparator::from_json("in", &json!("x")).is_err());
        assert!(Comparator::from_json("like", &json!("x")).is_err());
    }

    #[test]
    fn test_sort_order() {
        assert_eq!(sort_order(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(sort_order(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(sort_order(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(
            sort_order(&json!("2024-02-01"), &json!("2024-01-15T10:00:00Z")),
            Ordering::Greater
        );
    }
}
