//! Typed values produced by query-parameter coercion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Declared type of an entity field, as reported by a field-type provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Integer or floating point number.
    Number,
    /// Boolean flag.
    Boolean,
    /// Calendar date/time.
    Date,
    /// Reference to another record by id.
    Reference,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Reference => "reference",
        };
        f.write_str(name)
    }
}

/// Opaque 12-byte record reference.
///
/// Accepted in two textual shapes: 24 hex characters, or exactly 12 raw
/// bytes. Always rendered as 24 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId([u8; 12]);

impl RefId {
    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 24;
    /// Length of the raw byte form.
    pub const RAW_LEN: usize = 12;

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Parse the 24-character hex form.
    pub fn parse_hex(s: &str) -> Option<Self> {
        if s.len() != Self::HEX_LEN {
            return None;
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Interpret a 12-byte string as the raw form.
    pub fn from_raw_str(s: &str) -> Option<Self> {
        let raw: [u8; 12] = s.as_bytes().try_into().ok()?;
        Some(Self(raw))
    }

    /// Returns true if `s` is the unambiguous 24-hex form.
    pub fn is_hex_shape(s: &str) -> bool {
        s.len() == Self::HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Returns true if `s` has either accepted reference shape.
    pub fn is_reference_shape(s: &str) -> bool {
        Self::is_hex_shape(s) || s.len() == Self::RAW_LEN
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefId({})", self.to_hex())
    }
}

impl FromStr for RefId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
            .or_else(|| Self::from_raw_str(s))
            .ok_or_else(|| Error::InvalidReference(s.to_string()))
    }
}

impl Serialize for RefId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RefId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RefId::parse_hex(&s).ok_or_else(|| serde::de::Error::custom(Error::InvalidReference(s)))
    }
}

/// A typed value used in filter constraints.
///
/// Values are produced from untrusted query-string text by the coercion
/// stage and compared against stored documents by the datastore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Null / absent.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// UTC timestamp.
    Date(DateTime<Utc>),
    /// Record reference.
    Reference(RefId),
    /// Regular expression pattern.
    Regex {
        /// Pattern source.
        pattern: String,
        /// Match without regard to case.
        case_insensitive: bool,
    },
    /// List of values (for `in` / `nin`).
    Array(Vec<Value>),
}

impl Value {
    /// Build a regex value.
    pub fn regex(pattern: impl Into<String>, case_insensitive: bool) -> Self {
        Value::Regex {
            pattern: pattern.into(),
            case_insensitive,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as f64 (integers widen).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an array slice.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Render as the JSON shape stored documents use.
    ///
    /// Dates become RFC 3339 strings and references their hex form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => {
                serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Reference(r) => serde_json::Value::String(r.to_hex()),
            Value::Regex { pattern, .. } => serde_json::Value::String(pattern.clone()),
            Value::Array(values) => {
                serde_json::Value::Array(values.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(d) => write!(f, "date({})", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Reference(r) => write!(f, "ref({})", r),
            Value::Regex {
                pattern,
                case_insensitive,
            } => {
                write!(f, "/{}/", pattern)?;
                if *case_insensitive {
                    f.write_str("i")?;
                }
                Ok(())
            }
            Value::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<RefId> for Value {
    fn from(v: RefId) -> Self {
        Value::Reference(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
