//! Entity catalog.
//!
//! Descriptors say which fields an entity has, how it is scoped by tenant and
//! soft delete, which fields callers may sort, select and search by, and
//! which relations `populate` may follow.

mod catalog;
mod entity;
mod field;
mod relation;

pub use catalog::Catalog;
pub use entity::{EntityDescriptor, ALWAYS_SELECTABLE, DEFAULT_ID_FIELD};
pub use field::FieldDef;
pub use relation::{Cardinality, RelationDef};

use sieve_proto::FieldType;

/// Schema introspection consumed by type coercion.
///
/// Returns `None` for fields the schema does not know; coercion then
/// auto-detects the value's type.
pub trait FieldTypeProvider: Send + Sync {
    /// Declared type of `path` on `entity`.
    fn field_type(&self, entity: &str, path: &str) -> Option<FieldType>;
}

impl FieldTypeProvider for EntityDescriptor {
    fn field_type(&self, entity: &str, path: &str) -> Option<FieldType> {
        if entity != self.name {
            return None;
        }
        EntityDescriptor::field_type(self, path)
    }
}
