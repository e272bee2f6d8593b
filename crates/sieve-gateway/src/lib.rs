//! Sieve HTTP gateway.
//!
//! Exposes the listing engine over REST: `GET /api/{entity}` runs a listing
//! from query-string parameters, `GET /api/{entity}/explain` describes one.
//! Tenant and actor identity arrive in the `x-tenant-id` and `x-actor-id`
//! headers, already authenticated upstream.

pub mod config;
pub mod error;
pub mod json;
pub mod routes;

pub use config::{Args, GatewayConfig};
pub use error::AppError;

use std::sync::Arc;

use axum::Router;
use sieve_core::QueryEngine;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Listing engine.
    pub engine: Arc<QueryEngine>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl AppState {
    /// Create new application state.
    pub fn new(engine: QueryEngine, config: GatewayConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
        }
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::listing::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
