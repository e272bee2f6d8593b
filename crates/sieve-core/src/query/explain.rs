//! Query explanation service.
//!
//! Describes what a request compiles to (scoped filter, ordering, page
//! window, relation expansions, pipeline and cache key) without running it.

use sieve_proto::{ExplainResult, PaginationState, PopulateSummary, SortDirection};

use super::builder::CompiledQuery;
use super::cache::QueryCache;
use super::populate::PopulatePlan;
use super::strategy::QueryStrategy;
use crate::error::Result;

/// Service for explaining compiled queries.
pub struct ExplainService<'a> {
    cache: Option<&'a QueryCache>,
}

impl<'a> ExplainService<'a> {
    /// Create a new explain service.
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Report whether responses are cached for the explained key.
    pub fn with_cache(mut self, cache: Option<&'a QueryCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Explain a compiled query.
    ///
    /// Reads the cache to report whether a live entry exists; never touches
    /// the datastore.
    pub async fn explain(
        &self,
        query: &CompiledQuery,
        strategy: &dyn QueryStrategy,
    ) -> Result<ExplainResult> {
        let cache_key = query.cache_key()?;
        let cached = match self.cache {
            Some(cache) => cache.read(&cache_key).await.is_some(),
            None => false,
        };

        let populate: Vec<PopulateSummary> =
            query.populate.iter().flat_map(PopulatePlan::summaries).collect();
        let pipeline = strategy.pipeline(query);
        let explanation = generate_explanation(query, &populate, cached);

        Ok(ExplainResult {
            entity: query.entity.clone(),
            filter: query.filter.clone(),
            filter_description: query.filter.to_string(),
            sort: query.sort.clone(),
            projection: query.projection.clone(),
            pagination: query.pagination.clone(),
            populate,
            execution_path: query.path,
            pipeline,
            cache_key,
            cached,
            explanation,
        })
    }
}

impl Default for ExplainService<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_explanation(
    query: &CompiledQuery,
    populate: &[PopulateSummary],
    cached: bool,
) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Query Plan for {}", query.entity));
    lines.push("=".repeat(40));
    if cached {
        lines.push("Cache Status: HIT".to_string());
    } else {
        lines.push("Cache Status: MISS".to_string());
    }
    lines.push(format!("Execution Path: {}", query.path));
    lines.push(String::new());

    match &query.projection {
        Some(fields) => lines.push(format!("Fields: {}", fields.join(", "))),
        None => lines.push("Fields: * (all)".to_string()),
    }

    if query.filter.is_empty() {
        lines.push("Filter: none".to_string());
    } else {
        lines.push(format!("Filter: {}", query.filter));
    }
    if let Some(term) = &query.search {
        lines.push(format!("Search: {:?}", term));
    }

    let orders: Vec<String> = query
        .sort
        .iter()
        .map(|s| {
            let dir = match s.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {}", s.field, dir)
        })
        .collect();
    lines.push(format!("Order By: {}", orders.join(", ")));

    match &query.pagination {
        PaginationState::Offset { page, limit, skip } => {
            lines.push(format!("Pagination: PAGE {}, LIMIT {}, OFFSET {}", page, limit, skip));
        }
        PaginationState::Cursor {
            cursor_field,
            cursor_value,
            last_id,
            limit,
            ..
        } => {
            let after = match last_id {
                Some(id) => format!("({}, {})", cursor_value, id),
                None => cursor_value.to_string(),
            };
            lines.push(format!(
                "Pagination: CURSOR {} after {}, LIMIT {}",
                cursor_field, after, limit
            ));
        }
    }

    if !populate.is_empty() {
        lines.push(String::new());
        lines.push("Populate:".to_string());
        for summary in populate {
            lines.push(format!(
                "  - {} -> {} (depth: {})",
                summary.path, summary.target_entity, summary.depth
            ));
            lines.push(format!("      scope: {}", summary.filter));
        }
    }

    lines.join("\n")
}
