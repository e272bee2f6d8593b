//! Relations used by `populate`.

use serde::{Deserialize, Serialize};

/// How many related rows a relation yields per source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one related row, attached as an object.
    #[default]
    One,
    /// Any number of related rows, attached as an array.
    Many,
}

/// A named link from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name, as used in `populate` paths and as the output field.
    pub name: String,
    /// Related entity.
    pub target_entity: String,
    /// Field on the source rows holding the link value.
    pub local_field: String,
    /// Field on the target rows matched against `local_field`.
    pub foreign_field: String,
    /// Relation cardinality.
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl RelationDef {
    /// Relation where the source row stores the target's key.
    pub fn one(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target_entity: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_entity: target_entity.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            cardinality: Cardinality::One,
        }
    }

    /// Relation where many target rows point back at the source row.
    pub fn many(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target_entity: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one(name, local_field, target_entity, foreign_field)
        }
    }

    /// Check if the relation yields an array.
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}
