//! Conversion of raw parameter strings into typed values.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use sieve_proto::{FieldType, RefId, Value};

use super::spec::ParamValue;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("valid number pattern"))
}

fn auto_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^-?(0|[1-9]\d*)(\.\d+)?$").expect("valid number pattern"))
}

fn parse_number(s: &str) -> Option<Value> {
    if !number_pattern().is_match(s) {
        return None;
    }
    if s.contains('.') {
        s.parse::<f64>().ok().map(Value::Float)
    } else {
        s.parse::<i64>()
            .ok()
            .map(Value::Int)
            .or_else(|| s.parse::<f64>().ok().map(Value::Float))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse RFC 3339, `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` (taken as UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_reference(s: &str) -> Option<RefId> {
    RefId::parse_hex(s).or_else(|| RefId::from_raw_str(s))
}

/// Coerce one raw string. Never fails: unparsable input stays a string.
pub fn coerce_str(raw: &str, hint: Option<FieldType>) -> Value {
    match hint {
        Some(FieldType::Reference) => parse_reference(raw)
            .map(Value::Reference)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(FieldType::Number) => {
            parse_number(raw).unwrap_or_else(|| Value::String(raw.to_string()))
        }
        Some(FieldType::Boolean) => parse_bool(raw)
            .map(Value::Bool)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(FieldType::Date) => parse_date(raw)
            .map(Value::Date)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(FieldType::String) => Value::String(raw.to_string()),
        None => auto_detect(raw),
    }
}

/// Guess a type for a field the schema does not know.
fn auto_detect(raw: &str) -> Value {
    if RefId::is_hex_shape(raw) {
        if let Some(id) = RefId::parse_hex(raw) {
            return Value::Reference(id);
        }
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if auto_number_pattern().is_match(raw) {
        if let Some(number) = parse_number(raw) {
            return number;
        }
    }
    if raw.len() >= 10 && raw.as_bytes()[4] == b'-' {
        if let Some(date) = parse_date(raw) {
            return Value::Date(date);
        }
    }
    Value::String(raw.to_string())
}

/// Coerce a parameter; repeated values become an array.
pub fn coerce(raw: &ParamValue, hint: Option<FieldType>) -> Value {
    match raw {
        ParamValue::Single(s) => coerce_str(s, hint),
        ParamValue::Many(values) => {
            Value::Array(values.iter().map(|v| coerce_str(v, hint)).collect())
        }
    }
}

/// Coerce a stored JSON value into a constraint value.
///
/// Strings go through [`coerce_str`] with the hint; arrays are flattened.
pub fn coerce_json(json: &serde_json::Value, hint: Option<FieldType>) -> Vec<Value> {
    match json {
        serde_json::Value::Null => vec![Value::Null],
        serde_json::Value::Bool(b) => vec![Value::Bool(*b)],
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => vec![Value::Int(i)],
            None => n.as_f64().map(Value::Float).into_iter().collect(),
        },
        serde_json::Value::String(s) => vec![coerce_str(s, hint.or(Some(FieldType::String)))],
        serde_json::Value::Array(items) => {
            items.iter().flat_map(|v| coerce_json(v, hint)).collect()
        }
        serde_json::Value::Object(_) => vec![],
    }
}
