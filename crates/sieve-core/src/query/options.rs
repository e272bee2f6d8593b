//! Per-request options supplied by the route handler.

use std::collections::BTreeSet;
use std::time::Duration;

use sieve_proto::{ExecutionPath, Operator};

use super::pagination::PaginationStrategy;
use super::search::SearchStrategy;

/// Options a route handler sets for one listing request.
///
/// These come from trusted code, never from the query string.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Narrow the operator allowlist for bracketed `field[op]` keys.
    pub allowed_operators: Option<BTreeSet<Operator>>,
    /// Accept explicit tenant constraints that differ from the caller's.
    pub allow_tenant_override: bool,
    /// Include soft-deleted rows.
    pub include_deleted: bool,
    /// Fields searched by `search=`, overriding the entity's.
    pub search_fields: Option<Vec<String>>,
    /// How `search=` is compiled.
    pub search_strategy: SearchStrategy,
    /// Pagination strategy.
    pub pagination: PaginationStrategy,
    /// Datastore path, overriding the engine default.
    pub execution_path: Option<ExecutionPath>,
    /// Consult and fill the cache.
    pub use_cache: bool,
    /// Cache TTL override.
    pub cache_ttl: Option<Duration>,
    /// Datastore timeout override.
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            allowed_operators: None,
            allow_tenant_override: false,
            include_deleted: false,
            search_fields: None,
            search_strategy: SearchStrategy::default(),
            pagination: PaginationStrategy::default(),
            execution_path: None,
            use_cache: true,
            cache_ttl: None,
            timeout: None,
        }
    }
}

impl QueryOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept these bracketed operators.
    pub fn with_allowed_operators(mut self, ops: impl IntoIterator<Item = Operator>) -> Self {
        self.allowed_operators = Some(ops.into_iter().collect());
        self
    }

    /// Accept conflicting tenant constraints.
    pub fn with_tenant_override(mut self) -> Self {
        self.allow_tenant_override = true;
        self
    }

    /// Include soft-deleted rows.
    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Set search fields.
    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the search strategy.
    pub fn with_search_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.search_strategy = strategy;
        self
    }

    /// Set the pagination strategy.
    pub fn with_pagination(mut self, strategy: PaginationStrategy) -> Self {
        self.pagination = strategy;
        self
    }

    /// Set the execution path.
    pub fn with_execution_path(mut self, path: ExecutionPath) -> Self {
        self.execution_path = Some(path);
        self
    }

    /// Bypass the cache.
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Override the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Override the datastore timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check if a bracketed operator is permitted.
    pub fn permits(&self, op: Operator) -> bool {
        self.allowed_operators
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&op))
    }
}
