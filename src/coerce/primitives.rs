//! Single-value coercers.
//!
//! Each coercer accepts the value's native kind plus a small set of text
//! encodings, and refuses anything it cannot convert without guessing.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::schema::PrimitiveKind;
use crate::value::{ObjectId, Value};

static BASE64_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{3}=|[A-Za-z0-9+/]{2}==)?$")
        .expect("base64 pattern is valid")
});

/// Coerces a non-null value to a primitive kind. The error is a short
/// description of what was wrong.
pub fn coerce_primitive(kind: PrimitiveKind, value: Value) -> Result<Value, String> {
    match kind {
        PrimitiveKind::Boolean => to_boolean(value),
        PrimitiveKind::Int32 => to_int32(value),
        PrimitiveKind::Double => to_double(value),
        PrimitiveKind::String => to_string(value),
        PrimitiveKind::Binary => to_binary(value),
        PrimitiveKind::ObjectId => to_object_id(value),
        PrimitiveKind::Date => to_date(value),
    }
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {}, got {}", expected, value.type_name())
}

fn to_boolean(value: Value) -> Result<Value, String> {
    match value {
        Value::Boolean(_) => Ok(value),
        Value::String(ref s) if s == "true" => Ok(Value::Boolean(true)),
        Value::String(ref s) if s == "false" => Ok(Value::Boolean(false)),
        Value::String(s) => Err(format!("'{}' is not a boolean", s)),
        other => Err(mismatch("bool", &other)),
    }
}

/// Parses numeric text. Empty strings and non-finite results are refused.
fn parse_number(text: &str) -> Result<f64, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty string is not a number".to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(format!("'{}' is not a finite number", text)),
    }
}

fn to_number(value: &Value) -> Result<f64, String> {
    match value {
        Value::Int32(n) => Ok(*n as f64),
        Value::Int64(n) => Ok(*n as f64),
        Value::Double(d) if d.is_finite() => Ok(*d),
        Value::Double(d) => Err(format!("{} is not a finite number", d)),
        Value::String(s) => parse_number(s),
        other => Err(mismatch("number", other)),
    }
}

fn to_int32(value: Value) -> Result<Value, String> {
    if let Value::Int32(_) = value {
        return Ok(value);
    }
    if let Value::Int64(n) = value {
        return i32::try_from(n)
            .map(Value::Int32)
            .map_err(|_| format!("{} does not fit a 32-bit integer", n));
    }
    let n = to_number(&value)?;
    if n.fract() != 0.0 {
        return Err(format!("{} is not a whole number", n));
    }
    if n < i32::MIN as f64 || n > i32::MAX as f64 {
        return Err(format!("{} does not fit a 32-bit integer", n));
    }
    Ok(Value::Int32(n as i32))
}

fn to_double(value: Value) -> Result<Value, String> {
    to_number(&value).map(Value::Double)
}

fn to_string(value: Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value),
        Value::Boolean(b) => Ok(Value::String(b.to_string())),
        Value::Int32(n) => Ok(Value::String(n.to_string())),
        Value::Int64(n) => Ok(Value::String(n.to_string())),
        Value::Double(d) => Ok(Value::String(d.to_string())),
        Value::ObjectId(id) => Ok(Value::String(id.to_hex())),
        Value::DateTime(_) => Ok(Value::String(value.to_json().as_str().unwrap_or_default().to_string())),
        other => Err(mismatch("string", &other)),
    }
}

fn to_binary(value: Value) -> Result<Value, String> {
    match value {
        Value::Binary(_) => Ok(value),
        Value::String(s) => {
            if BASE64_PATTERN.is_match(&s) {
                if let Ok(bytes) = BASE64.decode(s.as_bytes()) {
                    return Ok(Value::Binary(bytes));
                }
            }
            Ok(Value::Binary(s.into_bytes()))
        }
        other => Err(mismatch("binData", &other)),
    }
}

fn to_object_id(value: Value) -> Result<Value, String> {
    match value {
        Value::ObjectId(_) => Ok(value),
        Value::String(s) => ObjectId::parse_str(&s)
            .map(Value::ObjectId)
            .ok_or_else(|| format!("'{}' is not a 24 character hex identifier", s)),
        other => Err(mismatch("objectId", &other)),
    }
}

fn to_date(value: Value) -> Result<Value, String> {
    match value {
        Value::DateTime(_) => Ok(value),
        Value::String(s) => parse_date(&s)
            .map(Value::DateTime)
            .ok_or_else(|| format!("'{}' is not an ISO 8601 date", s)),
        other => Err(mismatch("date", &other)),
    }
}

/// Accepts RFC 3339 timestamps, zone-less date-times (read as UTC) and
/// bare dates (UTC midnight).
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ok(kind: PrimitiveKind, value: impl Into<Value>) -> Value {
        coerce_primitive(kind, value.into()).unwrap()
    }

    fn fails(kind: PrimitiveKind, value: impl Into<Value>) -> bool {
        coerce_primitive(kind, value.into()).is_err()
    }

    #[test]
    fn test_native_values_pass_unchanged() {
        let id = ObjectId::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let cases = vec![
            (PrimitiveKind::Boolean, Value::Boolean(true)),
            (PrimitiveKind::Int32, Value::Int32(-7)),
            (PrimitiveKind::Double, Value::Double(2.5)),
            (PrimitiveKind::String, Value::from("x")),
            (PrimitiveKind::Binary, Value::Binary(vec![0, 159, 146, 150])),
            (PrimitiveKind::ObjectId, Value::ObjectId(id)),
            (PrimitiveKind::Date, Value::DateTime(now)),
        ];
        for (kind, value) in cases {
            assert_eq!(coerce_primitive(kind, value.clone()).unwrap(), value, "{:?}", kind);
        }
    }

    #[test]
    fn test_boolean() {
        assert_eq!(ok(PrimitiveKind::Boolean, "true"), Value::Boolean(true));
        assert_eq!(ok(PrimitiveKind::Boolean, "false"), Value::Boolean(false));
        assert!(fails(PrimitiveKind::Boolean, "yes"));
        assert!(fails(PrimitiveKind::Boolean, 1));
    }

    #[test]
    fn test_int32() {
        assert_eq!(ok(PrimitiveKind::Int32, "42"), Value::Int32(42));
        assert_eq!(ok(PrimitiveKind::Int32, " 7 "), Value::Int32(7));
        assert_eq!(ok(PrimitiveKind::Int32, 3.0), Value::Int32(3));
        assert_eq!(ok(PrimitiveKind::Int32, 5i64), Value::Int32(5));
        assert!(fails(PrimitiveKind::Int32, 3.5));
        assert!(fails(PrimitiveKind::Int32, "3.5"));
        assert!(fails(PrimitiveKind::Int32, 3_000_000_000i64));
        assert!(fails(PrimitiveKind::Int32, "3000000000"));
        assert!(fails(PrimitiveKind::Int32, "abc"));
        assert!(fails(PrimitiveKind::Int32, ""));
        assert!(fails(PrimitiveKind::Int32, true));
    }

    #[test]
    fn test_double() {
        assert_eq!(ok(PrimitiveKind::Double, "1.25"), Value::Double(1.25));
        assert_eq!(ok(PrimitiveKind::Double, 4), Value::Double(4.0));
        assert!(fails(PrimitiveKind::Double, "NaN"));
        assert!(fails(PrimitiveKind::Double, "inf"));
        assert!(fails(PrimitiveKind::Double, f64::NAN));
    }

    #[test]
    fn test_string() {
        assert_eq!(ok(PrimitiveKind::String, 12), Value::from("12"));
        assert_eq!(ok(PrimitiveKind::String, false), Value::from("false"));
        assert!(fails(PrimitiveKind::String, Value::Array(vec![])));
        assert!(fails(PrimitiveKind::String, crate::value::Document::new()));
    }

    #[test]
    fn test_binary_base64_or_utf8() {
        assert_eq!(ok(PrimitiveKind::Binary, "aGk="), Value::Binary(b"hi".to_vec()));
        assert_eq!(ok(PrimitiveKind::Binary, "hi!"), Value::Binary(b"hi!".to_vec()));
        assert!(fails(PrimitiveKind::Binary, 5));
    }

    #[test]
    fn test_object_id() {
        let hex = "507f1f77bcf86cd799439011";
        assert_eq!(
            ok(PrimitiveKind::ObjectId, hex),
            Value::ObjectId(ObjectId::parse_str(hex).unwrap())
        );
        assert!(fails(PrimitiveKind::ObjectId, "507f1f77"));
        assert!(fails(PrimitiveKind::ObjectId, 5));
    }

    #[test]
    fn test_date_encodings() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(ok(PrimitiveKind::Date, "2024-01-02T03:04:05Z"), Value::DateTime(expected));
        assert_eq!(ok(PrimitiveKind::Date, "2024-01-02T05:04:05+02:00"), Value::DateTime(expected));
        assert_eq!(ok(PrimitiveKind::Date, "2024-01-02T03:04:05"), Value::DateTime(expected));
        assert_eq!(
            ok(PrimitiveKind::Date, "2024-01-02"),
            Value::DateTime(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert!(fails(PrimitiveKind::Date, "yesterday"));
        assert!(fails(PrimitiveKind::Date, 1_700_000_000));
    }
}
