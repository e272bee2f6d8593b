//! Sieve Core - query compilation, caching and execution for entity listings.
//!
//! Turns untrusted REST query parameters into tenant-scoped, cached
//! datastore queries. The engine knows nothing about business entities; it
//! consumes a [`Catalog`] of entity descriptors (field types, relations,
//! allowlists) and a [`QueryExecutor`] that talks to the datastore.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod query;
pub mod security;
pub mod store;

pub use catalog::{
    Cardinality, Catalog, EntityDescriptor, FieldDef, FieldTypeProvider, RelationDef,
};
pub use config::EngineConfig;
pub use engine::QueryEngine;
pub use error::{Error, Result, StoreError};
pub use metrics::{Histogram, MetricsRegistry};
pub use query::{
    CacheStore, CompiledQuery, Document, ExplainService, PaginationStrategy, ParamValue,
    QueryBuilder, QueryCache, QueryExecutor, QueryOptions, QuerySpec, SearchStrategy,
};
pub use security::SecurityContext;
pub use store::{MemoryCacheStore, MemoryStore};

/// Re-export protocol types.
pub use sieve_proto as proto;
