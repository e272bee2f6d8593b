//! Entity descriptors.

use serde::{Deserialize, Serialize};
use sieve_proto::{FieldType, SortSpec};

use super::field::FieldDef;
use super::relation::RelationDef;

/// Default identity field.
pub const DEFAULT_ID_FIELD: &str = "_id";

/// Fields any caller may project, whatever the entity's allowlist says.
pub const ALWAYS_SELECTABLE: [&str; 2] = ["createdAt", "updatedAt"];

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

/// Everything the engine needs to know about one listable entity.
///
/// Descriptors are plain data: a business module builds one in code or the
/// gateway loads them from a JSON catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity name.
    pub name: String,
    /// Identity field, used as the sort tie-break and default cursor field.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Field holding the owning tenant. `None` for global entities.
    #[serde(default)]
    pub tenant_field: Option<String>,
    /// Delete flag field for soft-deleted entities.
    #[serde(default)]
    pub soft_delete_field: Option<String>,
    /// Declared fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Relations available to `populate`.
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Fields callers may sort by. `None` allows any field.
    #[serde(default)]
    pub sortable_fields: Option<Vec<String>>,
    /// Fields callers may project. `None` allows any field.
    #[serde(default)]
    pub selectable_fields: Option<Vec<String>>,
    /// Fields searched by `search=`.
    #[serde(default)]
    pub search_fields: Vec<String>,
    /// Ordering when the request gives none.
    #[serde(default)]
    pub default_sort: Vec<SortSpec>,
}

impl EntityDescriptor {
    /// Create a descriptor with the default identity field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: default_id_field(),
            tenant_field: None,
            soft_delete_field: None,
            fields: Vec::new(),
            relations: Vec::new(),
            sortable_fields: None,
            selectable_fields: None,
            search_fields: Vec::new(),
            default_sort: Vec::new(),
        }
    }

    /// Set the identity field.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Scope the entity by tenant.
    pub fn with_tenant_field(mut self, field: impl Into<String>) -> Self {
        self.tenant_field = Some(field.into());
        self
    }

    /// Enable soft delete on the given flag field.
    pub fn with_soft_delete(mut self, field: impl Into<String>) -> Self {
        self.soft_delete_field = Some(field.into());
        self
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Restrict sorting to the given fields.
    pub fn with_sortable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sortable_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict projection to the given fields.
    pub fn with_selectable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectable_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the searchable fields.
    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default ordering.
    pub fn with_default_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.default_sort = sort;
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared type of a field.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        if name == self.id_field {
            return Some(
                self.get_field(name)
                    .map(|f| f.field_type)
                    .unwrap_or(FieldType::Reference),
            );
        }
        self.get_field(name).map(|f| f.field_type)
    }

    /// Get a relation by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Check if the entity is tenant-scoped.
    pub fn is_tenant_scoped(&self) -> bool {
        self.tenant_field.is_some()
    }

    /// Check if this entity has soft delete enabled.
    pub fn has_soft_delete(&self) -> bool {
        self.soft_delete_field.is_some()
    }

    /// Check if callers may sort by `field`.
    pub fn is_sortable(&self, field: &str) -> bool {
        match &self.sortable_fields {
            Some(allowed) => field == self.id_field || allowed.iter().any(|f| f == field),
            None => true,
        }
    }

    /// Check if callers may project `field`.
    pub fn is_selectable(&self, field: &str) -> bool {
        if field == self.id_field || ALWAYS_SELECTABLE.contains(&field) {
            return true;
        }
        match &self.selectable_fields {
            Some(allowed) => allowed.iter().any(|f| f == field),
            None => true,
        }
    }
}
