//! Datastore interface consumed by the engine.

use async_trait::async_trait;
use sieve_proto::{FilterExpr, FindQuery, PipelineStage};

use crate::error::StoreError;

/// A stored record.
pub type Document = serde_json::Value;

/// The datastore call behind every listing.
///
/// Implementations translate the compiled AST into their own query language.
/// The engine never inspects how.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Filtered, ordered, projected and windowed read.
    async fn find(&self, entity: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError>;

    /// Run an aggregation pipeline.
    async fn aggregate(
        &self,
        entity: &str,
        pipeline: &[PipelineStage],
    ) -> Result<Vec<Document>, StoreError>;

    /// Count rows matching a filter.
    async fn count(&self, entity: &str, filter: &FilterExpr) -> Result<u64, StoreError>;
}
