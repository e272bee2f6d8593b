//! The listing engine.
//!
//! [`QueryEngine`] ties compilation, the response cache and the datastore
//! together. It is `Send + Sync` and meant to be shared behind an `Arc`;
//! every request gets its own builder and trace.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use sieve_proto::{ExplainResult, Performance, QueryResponse};

use crate::catalog::{Catalog, EntityDescriptor};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::metrics::MetricsRegistry;
use crate::query::explain::ExplainService;
use crate::query::pagination::page_meta;
use crate::query::{
    CacheStore, CompiledQuery, QueryBuilder, QueryCache, QueryExecutor, QueryOptions, QuerySpec,
    QueryStrategy,
};
use crate::security::SecurityContext;

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Generic query/filter/pagination/caching engine.
pub struct QueryEngine {
    executor: Arc<dyn QueryExecutor>,
    cache: Option<QueryCache>,
    catalog: Arc<Catalog>,
    config: EngineConfig,
    metrics: Arc<MetricsRegistry>,
}

impl QueryEngine {
    /// Create an engine without a cache.
    pub fn new(executor: Arc<dyn QueryExecutor>, catalog: Catalog, config: EngineConfig) -> Self {
        Self {
            executor,
            cache: None,
            catalog: Arc::new(catalog),
            config,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Attach a cache store.
    pub fn with_cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(QueryCache::new(store));
        self
    }

    /// Share an existing metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Registered entities.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Metrics registry.
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn cache_for(&self, options: &QueryOptions) -> Option<&QueryCache> {
        if self.config.cache_enabled && options.use_cache {
            self.cache.as_ref()
        } else {
            None
        }
    }

    fn compile(
        &self,
        spec: &QuerySpec,
        entity: &EntityDescriptor,
        ctx: &SecurityContext,
        options: &QueryOptions,
    ) -> Result<(CompiledQuery, sieve_proto::ExecutionTrace, &'static dyn QueryStrategy)> {
        let builder = QueryBuilder::new(entity, &self.catalog, ctx, options, &self.config);
        let strategy = builder.strategy();
        match builder.build(spec) {
            Ok((query, trace)) => Ok((query, trace, strategy)),
            Err(e) => {
                if e.is_validation() {
                    self.metrics.record_validation_failure();
                    tracing::debug!(entity = %entity.name, error = %e, "query rejected");
                }
                Err(e)
            }
        }
    }

    /// Compile, serve from cache or run, and describe a listing request.
    pub async fn build_and_execute(
        &self,
        spec: &QuerySpec,
        entity: &EntityDescriptor,
        ctx: &SecurityContext,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let (query, mut trace, strategy) = self.compile(spec, entity, ctx, options)?;

        let cache = self.cache_for(options);
        let cache_key = match cache {
            Some(_) => Some(query.cache_key()?),
            None => None,
        };

        if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
            let lookup = Instant::now();
            let entry = cache.read(key).await;
            trace.record("cache_lookup", lookup.elapsed(), json!({ "hit": entry.is_some() }));

            if let Some(entry) = entry {
                self.metrics.record_cache_hit();
                let mut response = entry.data;
                response.performance = Performance {
                    total_ms: elapsed_ms(started),
                    from_cache: true,
                    cached_at: Some(entry.cached_at),
                    trace,
                };
                self.metrics
                    .record_query(&query.entity, response.data.len(), started.elapsed());
                tracing::info!(
                    entity = %query.entity,
                    rows = response.data.len(),
                    from_cache = true,
                    duration_ms = response.performance.total_ms,
                    "query served"
                );
                return Ok(response);
            }
            self.metrics.record_cache_miss();
        }

        let timeout = options.timeout.unwrap_or(self.config.query_timeout);
        let fetch_started = Instant::now();
        let work = async {
            let fetch = strategy.fetch(self.executor.as_ref(), &*self.catalog, &query);
            let count = async {
                if query.pagination.is_cursor() {
                    Ok(None)
                } else {
                    self.executor
                        .count(&query.entity, &query.filter)
                        .await
                        .map(Some)
                }
            };
            tokio::try_join!(fetch, count)
        };

        let (mut rows, total) = match tokio::time::timeout(timeout, work).await {
            Ok(Ok(out)) => out,
            Ok(Err(source)) => {
                self.metrics.record_datastore_error();
                tracing::error!(entity = %query.entity, error = %source, "datastore query failed");
                return Err(Error::Datastore {
                    entity: query.entity.clone(),
                    actor: ctx.actor_label().to_string(),
                    spec: query.spec.to_string(),
                    source,
                });
            }
            Err(_) => {
                trace.record("query", fetch_started.elapsed(), json!({ "timed_out": true }));
                self.metrics.record_timeout();
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!(entity = %query.entity, timeout_ms, "query timed out");
                return Err(Error::QueryTimeout {
                    entity: query.entity.clone(),
                    timeout_ms,
                    trace,
                });
            }
        };
        trace.record(
            "query",
            fetch_started.elapsed(),
            json!({ "rows": rows.len(), "counted": total.is_some(), "path": query.path }),
        );

        let pagination = page_meta(&query.pagination, &mut rows, total, &entity.id_field);
        let mut response = QueryResponse {
            metadata: query.metadata(rows.len()),
            data: rows,
            pagination,
            performance: Performance {
                total_ms: elapsed_ms(started),
                from_cache: false,
                cached_at: None,
                trace: trace.clone(),
            },
        };

        if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
            let ttl = options.cache_ttl.unwrap_or(self.config.cache_ttl);
            let write = Instant::now();
            let written = cache.write(key, &response, ttl).await;
            trace.record(
                "cache_write",
                write.elapsed(),
                json!({ "written": written, "ttl_secs": ttl.as_secs() }),
            );
            if written {
                self.metrics.record_cache_write();
            } else {
                self.metrics.record_cache_error();
            }
        }

        response.performance.trace = trace;
        response.performance.total_ms = elapsed_ms(started);
        self.metrics
            .record_query(&query.entity, response.data.len(), started.elapsed());
        tracing::info!(
            entity = %query.entity,
            rows = response.data.len(),
            from_cache = false,
            duration_ms = response.performance.total_ms,
            "query served"
        );
        Ok(response)
    }

    /// Look up an entity by name and list it.
    pub async fn list(
        &self,
        entity: &str,
        spec: &QuerySpec,
        ctx: &SecurityContext,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        let descriptor = self.catalog.require(entity)?;
        self.build_and_execute(spec, descriptor, ctx, options).await
    }

    /// Describe what a request compiles to without running it.
    pub async fn explain(
        &self,
        spec: &QuerySpec,
        entity: &EntityDescriptor,
        ctx: &SecurityContext,
        options: &QueryOptions,
    ) -> Result<ExplainResult> {
        let (query, _, strategy) = self.compile(spec, entity, ctx, options)?;
        ExplainService::new()
            .with_cache(self.cache_for(options))
            .explain(&query, strategy)
            .await
    }

    /// Drop every cached response for an entity. Returns the entries removed.
    pub async fn invalidate(&self, entity: &str) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        cache
            .invalidate_entity(entity)
            .await
            .map_err(|source| Error::Datastore {
                entity: entity.to_string(),
                actor: "system".to_string(),
                spec: "invalidate".to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("entities", &self.catalog.len())
            .field("cache", &self.cache.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCacheStore, MemoryStore};
    use serde_json::json;

    fn engine() -> (Arc<MemoryStore>, QueryEngine) {
        let store = Arc::new(MemoryStore::new());
        store.insert_many(
            "Note",
            (1..=3).map(|i| json!({"_id": format!("n{}", i), "tenantId": "t1", "rank": i})),
        );
        let catalog = Catalog::new().with_entity(
            EntityDescriptor::new("Note")
                .with_tenant_field("tenantId")
                .with_sortable(["rank"]),
        );
        let engine = QueryEngine::new(store.clone(), catalog, EngineConfig::default())
            .with_cache(Arc::new(MemoryCacheStore::new()));
        (store, engine)
    }

    #[tokio::test]
    async fn test_list_unknown_entity() {
        let (_, engine) = engine();
        let ctx = SecurityContext::for_tenant("t1");
        let err = engine
            .list("Nope", &QuerySpec::new(), &ctx, &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_trace_stages_on_miss_and_hit() {
        let (_, engine) = engine();
        let ctx = SecurityContext::for_tenant("t1");
        let spec = QuerySpec::new().with("sort", "rank");

        let miss = engine.list("Note", &spec, &ctx, &QueryOptions::default()).await.unwrap();
        let names = miss.performance.trace.stage_names();
        assert!(names.contains(&"cache_lookup"));
        assert!(names.contains(&"query"));
        assert_eq!(names.last(), Some(&"cache_write"));

        let hit = engine.list("Note", &spec, &ctx, &QueryOptions::default()).await.unwrap();
        assert!(hit.performance.from_cache);
        assert!(hit.performance.cached_at.is_some());
        assert!(!hit.performance.trace.stage_names().contains(&"query"));
        assert_eq!(hit.data, miss.data);
        assert_eq!(engine.metrics().cache_hits(), 1);
        assert_eq!(engine.metrics().cache_misses(), 1);
    }

    #[tokio::test]
    async fn test_datastore_error_carries_context() {
        let (store, engine) = engine();
        store.set_offline(true);
        let ctx = SecurityContext::for_tenant("t1").with_actor("u7");
        let err = engine
            .list("Note", &QuerySpec::new(), &ctx, &QueryOptions::new().without_cache())
            .await
            .unwrap_err();
        match err {
            Error::Datastore { entity, actor, .. } => {
                assert_eq!(entity, "Note");
                assert_eq!(actor, "u7");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.metrics().datastore_errors(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_without_cache() {
        let store = Arc::new(MemoryStore::new());
        let engine = QueryEngine::new(store, Catalog::new(), EngineConfig::default());
        assert_eq!(engine.invalidate("Note").await.unwrap(), 0);
    }
}
