//! JSON response types for the HTTP gateway.

use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status.
    pub status: String,
    /// Gateway version.
    pub version: String,
    /// Entities the engine can list.
    pub entities: Vec<String>,
    /// Whether responses are cached.
    pub cache_enabled: bool,
}
