//! Tenant and soft-delete scoping.
//!
//! These are the safety nets applied to every compiled filter, and to the
//! filter of every populated relation, whatever the caller asked for.

use sieve_proto::{Constraint, FieldType, Match, Operator, Value};

use super::context::SecurityContext;
use crate::catalog::EntityDescriptor;
use crate::error::{Error, Result};
use crate::query::coerce::coerce_str;

/// Value a tenant constraint compares against, typed like the tenant field.
fn tenant_value(entity: &EntityDescriptor, field: &str, tenant_id: &str) -> Value {
    let hint = entity.field_type(field).unwrap_or(FieldType::String);
    coerce_str(tenant_id, Some(hint))
}

/// Check an explicit constraint against the caller's tenant, in the form the
/// field types it or, for an undeclared field, the form auto-detection gives.
fn names_tenant(
    constraint: &Constraint,
    entity: &EntityDescriptor,
    field: &str,
    tenant_id: &str,
) -> bool {
    constraint.op == Operator::Eq
        && (constraint.value == tenant_value(entity, field, tenant_id)
            || constraint.value == coerce_str(tenant_id, None))
}

/// Make `base` carry an equality constraint on the caller's tenant.
///
/// An explicit constraint naming the caller's own tenant is kept as is. Any
/// other explicit constraint on the tenant field is rejected unless
/// `allow_override` is set, in which case it is kept and nothing is injected.
pub fn apply_tenant_scope(
    base: Match,
    entity: &EntityDescriptor,
    ctx: &SecurityContext,
    allow_override: bool,
) -> Result<Match> {
    let (Some(field), Some(tenant_id)) = (entity.tenant_field.as_deref(), ctx.tenant()) else {
        return Ok(base);
    };

    let Some(explicit) = base.get(field) else {
        return Ok(base.with(field, Constraint::eq(tenant_value(entity, field, tenant_id))));
    };

    if explicit.iter().all(|c| names_tenant(c, entity, field, tenant_id)) {
        return Ok(base);
    }
    if allow_override {
        tracing::debug!(entity = %entity.name, field, "tenant override accepted");
        return Ok(base);
    }
    Err(Error::validation(format!(
        "filter on '{}' conflicts with the caller's tenant",
        field
    )))
}

/// Exclude soft-deleted rows unless the caller filtered on the flag or asked
/// for deleted rows.
pub fn apply_soft_delete(base: Match, entity: &EntityDescriptor, include_deleted: bool) -> Match {
    match entity.soft_delete_field.as_deref() {
        Some(flag) if !include_deleted && !base.contains_field(flag) => {
            base.with(flag, Constraint::ne(true))
        }
        _ => base,
    }
}

/// Scoping filter for rows of `entity` reached through a relation.
pub fn relation_scope(entity: &EntityDescriptor, ctx: &SecurityContext) -> Match {
    let mut scope = Match::new();
    if let (Some(field), Some(tenant_id)) = (entity.tenant_field.as_deref(), ctx.tenant()) {
        scope = scope.with(field, Constraint::eq(tenant_value(entity, field, tenant_id)));
    }
    apply_soft_delete(scope, entity, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;
    use pretty_assertions::assert_eq;

    fn invoice() -> EntityDescriptor {
        EntityDescriptor::new("Invoice")
            .with_tenant_field("tenantId")
            .with_soft_delete("isDeleted")
    }

    #[test]
    fn test_tenant_injected_when_absent() {
        let scoped = apply_tenant_scope(
            Match::single("status", Constraint::eq("open")),
            &invoice(),
            &SecurityContext::for_tenant("t1"),
            false,
        )
        .unwrap();
        assert_eq!(scoped.get("tenantId"), Some(&[Constraint::eq("t1")][..]));
    }

    #[test]
    fn test_matching_explicit_tenant_kept() {
        let base = Match::single("tenantId", Constraint::eq("t1"));
        let scoped =
            apply_tenant_scope(base.clone(), &invoice(), &SecurityContext::for_tenant("t1"), false)
                .unwrap();
        assert_eq!(scoped, base);
    }

    #[test]
    fn test_typed_tenant_field_accepts_own_tenant() {
        let numeric = invoice().with_field(FieldDef::number("tenantId"));
        let base = Match::single("tenantId", Constraint::eq(42i64));
        let ctx = SecurityContext::for_tenant("42");
        assert_eq!(apply_tenant_scope(base.clone(), &numeric, &ctx, false).unwrap(), base);

        let tenant = "65a1b2c3d4e5f60718293a4b";
        let referenced = invoice().with_field(FieldDef::reference("tenantId"));
        let own = coerce_str(tenant, Some(FieldType::Reference));
        let base = Match::single("tenantId", Constraint::eq(own));
        let ctx = SecurityContext::for_tenant(tenant);
        assert_eq!(apply_tenant_scope(base.clone(), &referenced, &ctx, false).unwrap(), base);

        let other = Match::single("tenantId", Constraint::eq(43i64));
        assert!(apply_tenant_scope(other, &numeric, &SecurityContext::for_tenant("42"), false)
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_conflicting_tenant_rejected() {
        let base = Match::single("tenantId", Constraint::eq("t2"));
        let ctx = SecurityContext::for_tenant("t1");
        let err = apply_tenant_scope(base.clone(), &invoice(), &ctx, false).unwrap_err();
        assert!(err.is_validation());

        let overridden =
            apply_tenant_scope(base.clone(), &invoice(), &SecurityContext::for_tenant("t1"), true)
                .unwrap();
        assert_eq!(overridden, base);
    }

    #[test]
    fn test_unscoped_context_injects_nothing() {
        let ctx = SecurityContext::system();
        let scoped = apply_tenant_scope(Match::new(), &invoice(), &ctx, false).unwrap();
        assert!(scoped.is_empty());
    }

    #[test]
    fn test_soft_delete() {
        let entity = invoice();
        let scoped = apply_soft_delete(Match::new(), &entity, false);
        assert_eq!(scoped.get("isDeleted"), Some(&[Constraint::ne(true)][..]));

        assert!(apply_soft_delete(Match::new(), &entity, true).is_empty());

        let explicit = Match::single("isDeleted", Constraint::eq(true));
        assert_eq!(apply_soft_delete(explicit.clone(), &entity, false), explicit);
    }

    #[test]
    fn test_relation_scope() {
        let scope = relation_scope(&invoice(), &SecurityContext::for_tenant("t1"));
        assert_eq!(
            scope,
            Match::new()
                .with("tenantId", Constraint::eq("t1"))
                .with("isDeleted", Constraint::ne(true))
        );
    }
}
