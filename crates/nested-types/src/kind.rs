//! Attribute kinds and their cast rules.
//!
//! Every declared attribute has an [`AttrKind`]. Values supplied by callers
//! (form payloads, JSON fragments) are cast through the kind before they are
//! stored on a record, so `"123"` becomes `123` for an integer attribute and
//! `"0"` becomes `false` for a boolean one. Casting never fails: values that
//! cannot be represented become `null`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::TypeError;

/// String values that cast to `false` for boolean attributes.
const FALSE_STRINGS: &[&str] = &["0", "f", "F", "false", "FALSE", "off", "OFF"];

/// The declared kind of a record attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrKind {
    /// UTF-8 text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Double precision float.
    Float,
    /// `true` / `false`.
    Boolean,
    /// Timestamp, stored as an RFC 3339 string in UTC.
    DateTime,
    /// Any JSON value, stored untouched.
    #[default]
    Json,
}

impl AttrKind {
    /// Cast a user-supplied value into this kind.
    pub fn cast(self, value: &Value) -> Value {
        match self {
            Self::Json => value.clone(),
            Self::String => cast_string(value),
            Self::Integer => cast_integer(value),
            Self::Float => cast_float(value),
            Self::Boolean => cast_boolean(value),
            Self::DateTime => cast_datetime(value),
        }
    }

    /// Stable lowercase name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttrKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "boolean" => Ok(Self::Boolean),
            "datetime" => Ok(Self::DateTime),
            "json" | "value" => Ok(Self::Json),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// Returns `true` for values considered blank: `null`, `false`, whitespace
/// strings, and empty arrays or objects.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

fn cast_string(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        Value::Bool(true) => Value::String("t".into()),
        Value::Bool(false) => Value::String("f".into()),
        Value::Number(n) => Value::String(n.to_string()),
        other => Value::String(other.to_string()),
    }
}

fn cast_integer(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                        Value::from(f.trunc() as i64)
                    }
                    _ => Value::Null,
                }
            }
        }
        Value::String(s) => parse_integer_prefix(s.trim()).map_or(Value::Null, Value::from),
        Value::Bool(b) => Value::from(i64::from(*b)),
        _ => Value::Null,
    }
}

/// Parse the leading `[+-]?digits` of `s`, ignoring whatever follows.
fn parse_integer_prefix(s: &str) -> Option<i64> {
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

fn cast_float(value: &Value) -> Value {
    let float = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    float
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

fn cast_boolean(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::String(s) if s.is_empty() => Value::Null,
        Value::String(s) => Value::Bool(!FALSE_STRINGS.contains(&s.as_str())),
        Value::Number(n) => Value::Bool(n.as_f64() != Some(0.0)),
        _ => Value::Bool(true),
    }
}

fn cast_datetime(value: &Value) -> Value {
    let parsed = match value {
        Value::String(s) => parse_datetime(s.trim()),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    };
    parsed.map_or(Value::Null, |dt| {
        Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_kind_is_identity() {
        let value = json!({"a": [1, 2, {"b": null}]});
        assert_eq!(AttrKind::Json.cast(&value), value);
    }

    #[test]
    fn string_cast() {
        assert_eq!(AttrKind::String.cast(&json!("xx")), json!("xx"));
        assert_eq!(AttrKind::String.cast(&json!(12)), json!("12"));
        assert_eq!(AttrKind::String.cast(&json!(true)), json!("t"));
        assert_eq!(AttrKind::String.cast(&Value::Null), Value::Null);
    }

    #[test]
    fn integer_cast_from_strings() {
        assert_eq!(AttrKind::Integer.cast(&json!("123")), json!(123));
        assert_eq!(AttrKind::Integer.cast(&json!(" -7 ")), json!(-7));
        assert_eq!(AttrKind::Integer.cast(&json!("12.9")), json!(12));
        assert_eq!(AttrKind::Integer.cast(&json!("")), Value::Null);
        assert_eq!(AttrKind::Integer.cast(&json!("abc")), Value::Null);
    }

    #[test]
    fn integer_cast_from_numbers_and_booleans() {
        assert_eq!(AttrKind::Integer.cast(&json!(3.7)), json!(3));
        assert_eq!(AttrKind::Integer.cast(&json!(true)), json!(1));
        assert_eq!(AttrKind::Integer.cast(&json!(false)), json!(0));
        assert_eq!(AttrKind::Integer.cast(&json!([1])), Value::Null);
    }

    #[test]
    fn float_cast() {
        assert_eq!(AttrKind::Float.cast(&json!("1.5")), json!(1.5));
        assert_eq!(AttrKind::Float.cast(&json!(2)), json!(2.0));
        assert_eq!(AttrKind::Float.cast(&json!("nope")), Value::Null);
    }

    #[test]
    fn boolean_cast_false_values() {
        for v in [json!(false), json!(0), json!("0"), json!("f"), json!("off"), json!("FALSE")] {
            assert_eq!(AttrKind::Boolean.cast(&v), json!(false), "{v}");
        }
    }

    #[test]
    fn boolean_cast_true_and_blank() {
        assert_eq!(AttrKind::Boolean.cast(&json!("1")), json!(true));
        assert_eq!(AttrKind::Boolean.cast(&json!("yes")), json!(true));
        assert_eq!(AttrKind::Boolean.cast(&json!(1)), json!(true));
        assert_eq!(AttrKind::Boolean.cast(&json!("")), Value::Null);
    }

    #[test]
    fn datetime_cast_normalizes_to_utc() {
        assert_eq!(
            AttrKind::DateTime.cast(&json!("2024-01-02T03:04:05+02:00")),
            json!("2024-01-02T01:04:05Z")
        );
        assert_eq!(
            AttrKind::DateTime.cast(&json!("2024-01-02 03:04:05")),
            json!("2024-01-02T03:04:05Z")
        );
        assert_eq!(AttrKind::DateTime.cast(&json!(0)), json!("1970-01-01T00:00:00Z"));
        assert_eq!(AttrKind::DateTime.cast(&json!("garbage")), Value::Null);
    }

    #[test]
    fn kind_parses_from_str() {
        assert_eq!("integer".parse::<AttrKind>(), Ok(AttrKind::Integer));
        assert_eq!("value".parse::<AttrKind>(), Ok(AttrKind::Json));
        assert_eq!(
            "decimal".parse::<AttrKind>(),
            Err(TypeError::UnknownKind("decimal".into()))
        );
    }

    #[test]
    fn kind_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&AttrKind::DateTime).unwrap();
        assert_eq!(json, "\"datetime\"");
        let parsed: AttrKind = serde_json::from_str("\"boolean\"").unwrap();
        assert_eq!(parsed, AttrKind::Boolean);
    }

    #[test]
    fn blank_values() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("  ")));
        assert!(is_blank(&json!(false)));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!("a")));
    }
}
