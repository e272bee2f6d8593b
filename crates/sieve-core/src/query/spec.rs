//! Raw query parameters.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Parameter names with engine meaning; never compiled into filters.
pub const RESERVED_KEYS: [&str; 11] = [
    "page",
    "limit",
    "sort",
    "fields",
    "select",
    "search",
    "populate",
    "cursor",
    "lastId",
    "cursorField",
    "includeDeleted",
];

/// Check if a parameter name is reserved.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// One parameter's value: a single string or a repeated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// `key=value`
    Single(String),
    /// `key=a&key=b`
    Many(Vec<String>),
}

impl ParamValue {
    /// First value.
    pub fn first(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::Many(values) => values.first().map(String::as_str),
        }
    }

    /// All values in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::Single(s) => vec![s.as_str()],
            ParamValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Check if every value is empty.
    pub fn is_blank(&self) -> bool {
        self.values().iter().all(|v| v.is_empty())
    }

    fn push(&mut self, value: String) {
        match self {
            ParamValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = ParamValue::Many(vec![first, value]);
            }
            ParamValue::Many(values) => values.push(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Single(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Single(s)
    }
}

/// Query parameters as received, keyed by name.
///
/// Ordered, so two specs with the same parameters serialize identically
/// whatever order the client sent them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuerySpec {
    params: BTreeMap<String, ParamValue>,
}

impl QuerySpec {
    /// Empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs; repeated keys accumulate.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut spec = Self::new();
        for (key, value) in pairs {
            spec.append(key, value);
        }
        spec
    }

    /// Add a value, accumulating into a list when the key repeats.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.params.entry(key.into()) {
            Entry::Occupied(mut existing) => existing.get_mut().push(value),
            Entry::Vacant(slot) => {
                slot.insert(ParamValue::Single(value));
            }
        }
    }

    /// Builder form of [`QuerySpec::append`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(key, value);
        self
    }

    /// Set a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.params.insert(key.into(), value);
    }

    /// Get a parameter.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// First value of a parameter, if present and non-empty.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().filter(|v| !v.is_empty())
    }

    /// Check if a parameter is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QuerySpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_keys_accumulate() {
        let spec = QuerySpec::from_pairs([("status", "open"), ("status", "paid"), ("page", "2")]);
        assert_eq!(spec.len(), 2);
        assert_eq!(
            spec.get("status"),
            Some(&ParamValue::Many(vec!["open".into(), "paid".into()]))
        );
        assert_eq!(spec.get_str("page"), Some("2"));
    }

    #[test]
    fn test_order_independent_serialization() {
        let a = QuerySpec::from_pairs([("b", "2"), ("a", "1")]);
        let b = QuerySpec::from_pairs([("a", "1"), ("b", "2")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), r#"{"a":"1","b":"2"}"#);
    }

    #[test]
    fn test_blank_values() {
        assert!(ParamValue::from("").is_blank());
        assert!(ParamValue::Many(vec![String::new(), String::new()]).is_blank());
        assert!(!ParamValue::Many(vec![String::new(), "x".into()]).is_blank());
        assert_eq!(QuerySpec::new().with("limit", "").get_str("limit"), None);
    }

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved("cursorField"));
        assert!(is_reserved("includeDeleted"));
        assert!(!is_reserved("status"));
    }
}
