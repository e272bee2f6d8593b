//! Tenant isolation and soft-delete scoping.

pub mod context;
pub mod scope;

pub use context::SecurityContext;
pub use scope::{apply_soft_delete, apply_tenant_scope, relation_scope};
