//! Listing and explain endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use sieve_core::{EntityDescriptor, QueryOptions, QuerySpec, SecurityContext};
use sieve_proto::{ExplainResult, QueryResponse};

use crate::error::AppError;
use crate::AppState;

/// Header carrying the authenticated tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header carrying the authenticated actor.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Listing routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/:entity", get(handle_list))
        .route("/api/:entity/explain", get(handle_explain))
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Identity for a request. Tenant-scoped entities require a tenant header.
fn security_context(
    headers: &HeaderMap,
    entity: &EntityDescriptor,
) -> Result<SecurityContext, AppError> {
    let mut ctx = match header_value(headers, TENANT_HEADER) {
        Some(tenant) => SecurityContext::for_tenant(tenant),
        None if entity.is_tenant_scoped() => {
            return Err(AppError::BadRequest(format!(
                "{} requires the {} header",
                entity.name, TENANT_HEADER
            )));
        }
        None => SecurityContext::system(),
    };
    if let Some(actor) = header_value(headers, ACTOR_HEADER) {
        ctx = ctx.with_actor(actor);
    }
    Ok(ctx)
}

/// List an entity.
async fn handle_list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<QueryResponse>, AppError> {
    let descriptor = state.engine.catalog().require(&entity)?;
    let ctx = security_context(&headers, descriptor)?;
    let spec = QuerySpec::from_pairs(pairs);
    let response = state
        .engine
        .build_and_execute(&spec, descriptor, &ctx, &QueryOptions::default())
        .await?;
    Ok(Json(response))
}

/// Describe how a listing would run.
async fn handle_explain(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ExplainResult>, AppError> {
    let descriptor = state.engine.catalog().require(&entity)?;
    let ctx = security_context(&headers, descriptor)?;
    let spec = QuerySpec::from_pairs(pairs);
    let result = state
        .engine
        .explain(&spec, descriptor, &ctx, &QueryOptions::default())
        .await?;
    Ok(Json(result))
}
