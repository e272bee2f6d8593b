//! Caller identity that flows through every query.

use serde::{Deserialize, Serialize};

/// Already-authenticated caller identity.
///
/// The engine never decides who the caller is; it only guarantees that the
/// queries it builds stay inside the caller's tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Tenant the caller belongs to. `None` for system callers.
    pub tenant_id: Option<String>,
    /// Actor issuing the request, used for logging and error context.
    pub actor_id: Option<String>,
}

impl SecurityContext {
    /// Create a context scoped to a tenant.
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            actor_id: None,
        }
    }

    /// Create an unscoped system context.
    pub fn system() -> Self {
        Self::default()
    }

    /// Set the actor.
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Tenant id, if scoped.
    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Actor id, or `anonymous`.
    pub fn actor_label(&self) -> &str {
        self.actor_id.as_deref().unwrap_or("anonymous")
    }
}
