//! Sieve protocol types.
//!
//! This crate defines the intermediate representation shared by the Sieve
//! listing engine, its datastore adapters and its HTTP surface.
//!
//! # Modules
//!
//! - [`value`] - Typed values produced by query-parameter coercion
//! - [`filter`] - Compiled filter AST (`Match` / `Or` / `And`)
//! - [`query`] - Sort, pagination and datastore request types
//! - [`result`] - Listing responses, pagination metadata and execution traces
//! - [`explain`] - Explain output
//! - [`error`] - Protocol error types
//!
//! All types derive serde `Serialize`/`Deserialize`; JSON is the wire and
//! cache encoding.

pub mod error;
pub mod explain;
pub mod filter;
pub mod query;
pub mod result;
pub mod value;

pub use error::Error;

pub use explain::{ExplainResult, PopulateSummary};
pub use filter::{Constraint, FilterExpr, Match, Operator};
pub use query::{
    ExecutionPath, FindQuery, LookupStage, PaginationState, PipelineStage, SortDirection,
    SortSpec,
};
pub use result::{
    ExecutionTrace, PaginationMeta, Performance, QueryMetadata, QueryResponse, TraceStage,
};
pub use value::{FieldType, RefId, Value};

/// Version of the JSON shapes in this crate.
///
/// Part of every cache key so entries written by an incompatible build are
/// never read back.
pub const FORMAT_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_version() {
        assert_eq!(FORMAT_VERSION, 1);
    }

    #[test]
    fn test_response_roundtrip() {
        let response = QueryResponse {
            data: vec![serde_json::json!({"_id": "a", "name": "Widget"})],
            pagination: PaginationMeta::offset(1, 20, 1),
            metadata: QueryMetadata {
                entity: "Product".into(),
                filter: Match::single("tenantId", Constraint::eq("t1")).into(),
                sort: vec![SortSpec::desc("_id")],
                projection: None,
                search: None,
                populate: vec![],
                execution_path: ExecutionPath::Find,
                count: 1,
            },
            performance: Performance {
                total_ms: 1.0,
                from_cache: false,
                cached_at: None,
                trace: ExecutionTrace::new(),
            },
        };

        let bytes = serde_json::to_vec(&response).unwrap();
        let decoded: QueryResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(response, decoded);
    }
}
