//! Type inference from sample values
//!
//! Instance formats (JSON, CSV, XML, YAML) carry no declared types, so their
//! raw field types are inferred from the values themselves. The inference
//! follows a priority order from most specific to most general type:
//! boolean, integer, float, datetime, date, string.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Scalar kind of a single sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    /// Absent or empty
    Null,
    /// true/false/yes/no
    Boolean,
    /// Whole number
    Integer,
    /// Number with a fractional part or exponent
    Float,
    /// ISO 8601 date
    Date,
    /// ISO 8601 timestamp
    Datetime,
    /// Anything else textual
    String,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

impl ValueKind {
    /// Raw type name written into `FieldInfo.field_type`
    #[must_use]
    pub fn raw_type(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

#[allow(clippy::expect_used)]
static DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

#[allow(clippy::expect_used)]
static DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$")
        .expect("valid datetime regex")
});

/// Infer the kind of a single textual value
#[must_use]
pub fn infer_text(value: &str) -> ValueKind {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValueKind::Null;
    }
    if is_boolean(trimmed) {
        return ValueKind::Boolean;
    }
    if trimmed.parse::<i64>().is_ok() {
        return ValueKind::Integer;
    }
    if is_float(trimmed) {
        return ValueKind::Float;
    }
    if DATETIME.is_match(trimmed) && is_valid_datetime(trimmed) {
        return ValueKind::Datetime;
    }
    if DATE.is_match(trimmed) && NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok() {
        return ValueKind::Date;
    }
    ValueKind::String
}

/// Infer the kind of a JSON value; strings go through [`infer_text`]
#[must_use]
pub fn infer_json(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Integer,
        Value::Number(_) => ValueKind::Float,
        Value::String(s) => match infer_text(s) {
            // quoted numbers and booleans stay strings in typed formats
            ValueKind::Integer | ValueKind::Float | ValueKind::Boolean => ValueKind::String,
            ValueKind::Null => ValueKind::String,
            other => other,
        },
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

/// Most specific kind compatible with both inputs
#[must_use]
pub fn common_kind(a: ValueKind, b: ValueKind) -> ValueKind {
    match (a, b) {
        (x, y) if x == y => x,
        (ValueKind::Null, t) | (t, ValueKind::Null) => t,
        (ValueKind::Integer, ValueKind::Float) | (ValueKind::Float, ValueKind::Integer) => {
            ValueKind::Float
        }
        (ValueKind::Date, ValueKind::Datetime) | (ValueKind::Datetime, ValueKind::Date) => {
            ValueKind::Datetime
        }
        _ => ValueKind::String,
    }
}

/// Common kind of a sequence of kinds; `Null` when empty
pub fn fold_kinds<I: IntoIterator<Item = ValueKind>>(kinds: I) -> ValueKind {
    kinds.into_iter().fold(ValueKind::Null, common_kind)
}

/// Whether `kind` can be represented as `target`
#[must_use]
pub fn is_compatible(kind: ValueKind, target: ValueKind) -> bool {
    kind == target
        || kind == ValueKind::Null
        || target == ValueKind::String
        || matches!(
            (kind, target),
            (ValueKind::Integer, ValueKind::Float) | (ValueKind::Date, ValueKind::Datetime)
        )
}

/// Infer a common kind and the fraction of non-null samples agreeing with it
#[must_use]
pub fn infer_with_confidence(samples: &[&str]) -> (ValueKind, f64) {
    let kinds: Vec<ValueKind> = samples
        .iter()
        .map(|s| infer_text(s))
        .filter(|k| *k != ValueKind::Null)
        .collect();
    if kinds.is_empty() {
        return (ValueKind::Null, 0.0);
    }
    let common = fold_kinds(kinds.iter().copied());
    let exact = kinds.iter().filter(|k| **k == common).count();
    (common, exact as f64 / kinds.len() as f64)
}

fn is_boolean(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "true" | "false" | "yes" | "no"
    )
}

fn is_float(s: &str) -> bool {
    // reject inf/nan spellings that f64::from_str accepts
    s.bytes().any(|b| b.is_ascii_digit()) && s.parse::<f64>().is_ok_and(f64::is_finite)
}

fn is_valid_datetime(s: &str) -> bool {
    let head = s.get(..19).unwrap_or(s);
    NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s.get(..16).unwrap_or(s), "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(s.get(..16).unwrap_or(s), "%Y-%m-%d %H:%M"))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_scalars() {
        assert_eq!(infer_text("true"), ValueKind::Boolean);
        assert_eq!(infer_text("42"), ValueKind::Integer);
        assert_eq!(infer_text("-3.5"), ValueKind::Float);
        assert_eq!(infer_text("2021-01-05"), ValueKind::Date);
        assert_eq!(infer_text("2021-01-05T10:30:00Z"), ValueKind::Datetime);
        assert_eq!(infer_text("2021-13-45"), ValueKind::String);
        assert_eq!(infer_text("inf"), ValueKind::String);
        assert_eq!(infer_text("  "), ValueKind::Null);
        assert_eq!(infer_text("alice"), ValueKind::String);
    }

    #[test]
    fn test_ids_are_not_booleans() {
        assert_eq!(infer_text("1"), ValueKind::Integer);
        assert_eq!(infer_text("0"), ValueKind::Integer);
    }

    #[test]
    fn test_common_kind() {
        assert_eq!(fold_kinds([ValueKind::Integer, ValueKind::Float]), ValueKind::Float);
        assert_eq!(fold_kinds([ValueKind::Date, ValueKind::Datetime]), ValueKind::Datetime);
        assert_eq!(fold_kinds([ValueKind::Null, ValueKind::Integer]), ValueKind::Integer);
        assert_eq!(fold_kinds([ValueKind::Boolean, ValueKind::Integer]), ValueKind::String);
        assert_eq!(fold_kinds([]), ValueKind::Null);
    }

    #[test]
    fn test_json_values() {
        assert_eq!(infer_json(&json!(1)), ValueKind::Integer);
        assert_eq!(infer_json(&json!(1.5)), ValueKind::Float);
        assert_eq!(infer_json(&json!("2020-02-02")), ValueKind::Date);
        assert_eq!(infer_json(&json!("12")), ValueKind::String);
        assert_eq!(infer_json(&json!([1])), ValueKind::Array);
    }

    #[test]
    fn test_confidence_fraction() {
        let (kind, confidence) = infer_with_confidence(&["1", "2", "2.5", ""]);
        assert_eq!(kind, ValueKind::Float);
        assert!((confidence - 1.0 / 3.0).abs() < 1e-9);
    }
}
