//! Field definitions for entities.

use serde::{Deserialize, Serialize};
use sieve_proto::FieldType;

/// A field declared on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name, possibly a dotted path into an embedded document.
    pub name: String,
    /// Declared type, used as the coercion hint.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldDef {
    /// Create a new field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Create a string field.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// Create a numeric field.
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    /// Create a boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// Create a date field.
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    /// Create a reference field.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_json_shape() {
        let field: FieldDef = serde_json::from_str(r#"{"name":"price","type":"number"}"#).unwrap();
        assert_eq!(field, FieldDef::number("price"));
    }
}
