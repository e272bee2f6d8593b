//! Query compilation and execution.
//!
//! Raw parameters flow through these stages, each producing an immutable
//! piece of a [`CompiledQuery`]:
//!
//! 1. [`sanitize`] strips operator injection
//! 2. [`filter`] compiles the scoped base filter, using [`coerce`] for values
//! 3. [`search`] adds the search OR group
//! 4. [`sort`] resolves ordering and projection
//! 5. [`pagination`] resolves the page window
//! 6. [`populate`] plans relation expansion
//!
//! The [`cache`] layer and an execution [`strategy`] then run the compiled
//! query against a [`QueryExecutor`].

pub mod builder;
pub mod cache;
pub mod coerce;
pub mod executor;
pub mod explain;
pub mod filter;
pub mod options;
pub mod pagination;
pub mod populate;
pub mod sanitize;
pub mod search;
pub mod sort;
pub mod spec;
pub mod strategy;

pub use builder::{CompiledQuery, QueryBuilder};
pub use cache::{CacheEntry, CacheStore, QueryCache};
pub use coerce::{coerce, coerce_str};
pub use executor::{Document, QueryExecutor};
pub use explain::ExplainService;
pub use filter::FilterCompiler;
pub use options::QueryOptions;
pub use pagination::{PaginationPlan, PaginationStrategy};
pub use populate::{PopulatePlan, PopulateResolver};
pub use sanitize::sanitize;
pub use search::{SearchCompiler, SearchStrategy};
pub use spec::{ParamValue, QuerySpec, RESERVED_KEYS};
pub use strategy::{AggregateStrategy, FindStrategy, QueryStrategy};

/// Value at a dotted path inside a document.
///
/// Only walks objects; arrays along the path yield `None`.
pub fn json_path<'a>(doc: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}
