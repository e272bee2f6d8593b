//! Engine configuration.

use std::time::Duration;

use sieve_proto::ExecutionPath;

/// Default page size when `limit` is absent.
pub const DEFAULT_LIMIT: u64 = 20;

/// Hard ceiling on page size.
pub const DEFAULT_MAX_LIMIT: u64 = 100;

/// Maximum alternatives in one `[or]` group.
pub const DEFAULT_MAX_OR_CLAUSES: usize = 20;

/// Default cache entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default budget for datastore work per request.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum relation nesting for `populate`.
pub const DEFAULT_MAX_POPULATE_DEPTH: usize = 3;

/// Search terms are truncated to this many characters.
pub const DEFAULT_MAX_SEARCH_LENGTH: usize = 100;

/// Configuration shared by every request an engine serves.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size when the request gives none.
    pub default_limit: u64,

    /// Larger requested page sizes are clamped to this.
    pub max_limit: u64,

    /// Maximum values in one `[or]` list.
    pub max_or_clauses: usize,

    /// Lifetime of cache entries unless a request overrides it.
    pub cache_ttl: Duration,

    /// Whether the cache is consulted at all.
    pub cache_enabled: bool,

    /// Budget for fetch, count and population together.
    pub query_timeout: Duration,

    /// Maximum relation path depth.
    pub max_populate_depth: usize,

    /// Maximum search term length in characters.
    pub max_search_length: usize,

    /// Datastore path used when a request does not pick one.
    pub execution_path: ExecutionPath,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            max_or_clauses: DEFAULT_MAX_OR_CLAUSES,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_enabled: true,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_populate_depth: DEFAULT_MAX_POPULATE_DEPTH,
            max_search_length: DEFAULT_MAX_SEARCH_LENGTH,
            execution_path: ExecutionPath::Find,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default and maximum page sizes.
    pub fn with_limits(mut self, default_limit: u64, max_limit: u64) -> Self {
        self.max_limit = max_limit.max(1);
        self.default_limit = default_limit.clamp(1, self.max_limit);
        self
    }

    /// Set the OR-clause cap.
    pub fn with_max_or_clauses(mut self, max: usize) -> Self {
        self.max_or_clauses = max;
        self
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Enable or disable caching.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the datastore timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the maximum populate depth.
    pub fn with_max_populate_depth(mut self, depth: usize) -> Self {
        self.max_populate_depth = depth;
        self
    }

    /// Set the maximum search term length.
    pub fn with_max_search_length(mut self, len: usize) -> Self {
        self.max_search_length = len;
        self
    }

    /// Set the default execution path.
    pub fn with_execution_path(mut self, path: ExecutionPath) -> Self {
        self.execution_path = path;
        self
    }
}
