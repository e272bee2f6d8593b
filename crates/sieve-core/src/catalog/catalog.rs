//! Registry of entity descriptors.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use sieve_proto::FieldType;

use super::entity::EntityDescriptor;
use super::FieldTypeProvider;
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct CatalogFile {
    entities: Vec<EntityDescriptor>,
}

/// All entities an engine can list, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: BTreeMap<String, EntityDescriptor>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, replacing any previous descriptor with the same name.
    pub fn register(&mut self, entity: EntityDescriptor) {
        self.entities.insert(entity.name.clone(), entity);
    }

    /// Builder form of [`Catalog::register`].
    pub fn with_entity(mut self, entity: EntityDescriptor) -> Self {
        self.register(entity);
        self
    }

    /// Get an entity by name.
    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    /// Get an entity by name, failing with [`Error::UnknownEntity`].
    pub fn require(&self, name: &str) -> Result<&EntityDescriptor> {
        self.get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Entity names in order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if no entity is registered.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Parse a catalog from JSON of the form `{"entities": [...]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for entity in file.entities {
            catalog.register(entity);
        }
        Ok(catalog)
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Serialization(format!("failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

impl FieldTypeProvider for Catalog {
    /// Resolves dotted paths through relations: `customer.name` on `Invoice`
    /// is the `name` field of the `customer` relation's target.
    fn field_type(&self, entity: &str, path: &str) -> Option<FieldType> {
        let descriptor = self.get(entity)?;
        if let Some(ty) = descriptor.field_type(path) {
            return Some(ty);
        }
        let (head, rest) = path.split_once('.')?;
        let relation = descriptor.get_relation(head)?;
        self.field_type(&relation.target_entity, rest)
    }
}
