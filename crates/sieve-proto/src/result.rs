//! Response types for listing queries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::FilterExpr;
use crate::query::{ExecutionPath, SortSpec};

/// Timing of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStage {
    /// Stage name (e.g. `filter`, `query`, `cache_lookup`).
    pub stage: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Stage-specific details.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// Ordered per-request stage timings.
///
/// Created fresh for each request and returned to the caller; never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    stages: Vec<TraceStage>,
}

impl ExecutionTrace {
    /// Empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn record(
        &mut self,
        stage: impl Into<String>,
        duration: Duration,
        extra: serde_json::Value,
    ) {
        self.stages.push(TraceStage {
            stage: stage.into(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            extra,
        });
    }

    /// Recorded stages in order.
    pub fn stages(&self) -> &[TraceStage] {
        &self.stages
    }

    /// Look up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&TraceStage> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Stage names in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage.as_str()).collect()
    }

    /// Sum of all stage durations.
    pub fn total_ms(&self) -> f64 {
        self.stages.iter().map(|s| s.duration_ms).sum()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Pagination metadata returned with a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PaginationMeta {
    /// Offset pagination with a total count.
    Offset {
        /// Current page (one-based).
        page: u64,
        /// Page size.
        limit: u64,
        /// Total matching records.
        total: u64,
        /// Total pages.
        pages: u64,
        /// Whether a later page exists.
        has_next: bool,
        /// Whether an earlier page exists.
        has_prev: bool,
    },
    /// Cursor pagination without a count.
    Cursor {
        /// Page size.
        limit: u64,
        /// Field the cursor refers to.
        cursor_field: String,
        /// Whether more records follow.
        has_next: bool,
        /// Whether a cursor was supplied.
        has_prev: bool,
        /// Value to send as `cursor` for the next page.
        next_cursor: Option<serde_json::Value>,
        /// Value to send as `lastId` for the next page when the cursor field
        /// is not the identity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_last_id: Option<serde_json::Value>,
    },
}

impl PaginationMeta {
    /// Build offset metadata from page math.
    pub fn offset(page: u64, limit: u64, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        PaginationMeta::Offset {
            page,
            limit,
            total,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }

    /// Whether a later page exists.
    pub fn has_next(&self) -> bool {
        match self {
            PaginationMeta::Offset { has_next, .. } | PaginationMeta::Cursor { has_next, .. } => {
                *has_next
            }
        }
    }

    /// Whether an earlier page exists.
    pub fn has_prev(&self) -> bool {
        match self {
            PaginationMeta::Offset { has_prev, .. } | PaginationMeta::Cursor { has_prev, .. } => {
                *has_prev
            }
        }
    }
}

/// Description of how a response was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Entity queried.
    pub entity: String,
    /// Effective filter (base, search and cursor constraints).
    pub filter: FilterExpr,
    /// Effective ordering.
    pub sort: Vec<SortSpec>,
    /// Projection (`None` = all fields).
    pub projection: Option<Vec<String>>,
    /// Search term, if any.
    pub search: Option<String>,
    /// Populated relation paths.
    pub populate: Vec<String>,
    /// Datastore path used.
    pub execution_path: ExecutionPath,
    /// Number of records in `data`.
    pub count: usize,
}

/// Execution telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Total request time in milliseconds.
    pub total_ms: f64,
    /// Whether the response was served from cache.
    pub from_cache: bool,
    /// When the served cache entry was written.
    pub cached_at: Option<DateTime<Utc>>,
    /// Per-stage timings.
    pub trace: ExecutionTrace,
}

/// Result of a listing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Matching records.
    pub data: Vec<serde_json::Value>,
    /// Page metadata.
    pub pagination: PaginationMeta,
    /// Compilation details.
    pub metadata: QueryMetadata,
    /// Telemetry.
    pub performance: Performance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_meta_math() {
        let meta = PaginationMeta::offset(2, 10, 25);
        assert_eq!(
            meta,
            PaginationMeta::Offset {
                page: 2,
                limit: 10,
                total: 25,
                pages: 3,
                has_next: true,
                has_prev: true,
            }
        );

        let last = PaginationMeta::offset(3, 10, 25);
        assert!(!last.has_next());

        let empty = PaginationMeta::offset(1, 10, 0);
        assert!(!empty.has_next());
        assert!(!empty.has_prev());
    }

    #[test]
    fn test_trace_records_in_order() {
        let mut trace = ExecutionTrace::new();
        trace.record("filter", Duration::from_micros(1500), serde_json::Value::Null);
        trace.record("query", Duration::from_millis(3), serde_json::json!({"rows": 4}));

        assert_eq!(trace.stage_names(), vec!["filter", "query"]);
        assert!((trace.total_ms() - 4.5).abs() < 1e-9);
        assert_eq!(trace.stage("query").unwrap().extra["rows"], 4);
    }

    #[test]
    fn test_trace_serializes_as_list() {
        let mut trace = ExecutionTrace::new();
        trace.record("sort", Duration::ZERO, serde_json::Value::Null);
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json, serde_json::json!([{"stage": "sort", "duration_ms": 0.0}]));
    }
}
