//! Explain output for compiled queries.
//!
//! Returned by the explain accessor so callers can inspect what a request
//! compiles to without touching the datastore.

use serde::{Deserialize, Serialize};

use crate::filter::FilterExpr;
use crate::query::{ExecutionPath, PaginationState, PipelineStage, SortSpec};

/// Summary of one relation expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateSummary {
    /// Dotted relation path (e.g. `items.product`).
    pub path: String,
    /// Related entity.
    pub target_entity: String,
    /// Nesting depth (1 for top level).
    pub depth: u32,
    /// Scoping filter applied to related rows.
    pub filter: String,
}

/// Result of explaining a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainResult {
    /// Entity queried.
    pub entity: String,
    /// Effective filter.
    pub filter: FilterExpr,
    /// Human-readable filter.
    pub filter_description: String,
    /// Effective ordering.
    pub sort: Vec<SortSpec>,
    /// Projection (`None` = all fields).
    pub projection: Option<Vec<String>>,
    /// Resolved page window.
    pub pagination: PaginationState,
    /// Relation expansions.
    pub populate: Vec<PopulateSummary>,
    /// Datastore path.
    pub execution_path: ExecutionPath,
    /// Pipeline stages when the aggregate path is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<PipelineStage>>,
    /// Cache key the request maps to.
    pub cache_key: String,
    /// Whether a live cache entry exists for the key.
    pub cached: bool,
    /// Human-readable explanation text.
    pub explanation: String,
}
