//! Engine metrics registry.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::histogram::Histogram;

/// Counters and latencies for one engine.
///
/// Shared by every request; all updates are atomic.
pub struct MetricsRegistry {
    started_at: Instant,

    query_count: AtomicU64,
    query_latency: Histogram,
    queries_by_entity: DashMap<String, AtomicU64>,
    rows_returned: AtomicU64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_writes: AtomicU64,
    cache_errors: AtomicU64,

    timeouts: AtomicU64,
    validation_failures: AtomicU64,
    datastore_errors: AtomicU64,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            query_count: AtomicU64::new(0),
            query_latency: Histogram::latency(),
            queries_by_entity: DashMap::new(),
            rows_returned: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_writes: AtomicU64::new(0),
            cache_errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            datastore_errors: AtomicU64::new(0),
        }
    }

    /// Record a completed listing query.
    pub fn record_query(&self, entity: &str, rows: usize, elapsed: Duration) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.query_latency.observe(elapsed);
        self.rows_returned.fetch_add(rows as u64, Ordering::Relaxed);
        self.queries_by_entity
            .entry(entity.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache write.
    pub fn record_cache_write(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed cache read or write.
    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query timeout.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected request.
    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a datastore failure.
    pub fn record_datastore_error(&self) {
        self.datastore_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the registry was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Total listing queries served.
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Query counts by entity.
    pub fn queries_by_entity(&self) -> BTreeMap<String, u64> {
        self.queries_by_entity
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Total rows returned.
    pub fn rows_returned(&self) -> u64 {
        self.rows_returned.load(Ordering::Relaxed)
    }

    /// Cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Cache writes.
    pub fn cache_writes(&self) -> u64 {
        self.cache_writes.load(Ordering::Relaxed)
    }

    /// Cache store failures.
    pub fn cache_errors(&self) -> u64 {
        self.cache_errors.load(Ordering::Relaxed)
    }

    /// Cache hit ratio in `[0, 1]`.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits();
        let total = hits + self.cache_misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Query timeouts.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Rejected requests.
    pub fn validation_failures(&self) -> u64 {
        self.validation_failures.load(Ordering::Relaxed)
    }

    /// Datastore failures.
    pub fn datastore_errors(&self) -> u64 {
        self.datastore_errors.load(Ordering::Relaxed)
    }

    /// Query latency histogram.
    pub fn query_latency(&self) -> &Histogram {
        &self.query_latency
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        counter(&mut out, "sieve_uptime_seconds", "Seconds since start", self.uptime_secs());
        counter(&mut out, "sieve_queries_total", "Listing queries served", self.query_count());

        let _ = writeln!(out, "# HELP sieve_entity_queries_total Listing queries by entity");
        let _ = writeln!(out, "# TYPE sieve_entity_queries_total counter");
        for (entity, count) in self.queries_by_entity() {
            let _ = writeln!(out, "sieve_entity_queries_total{{entity=\"{}\"}} {}", entity, count);
        }

        counter(&mut out, "sieve_rows_returned_total", "Rows returned", self.rows_returned());
        counter(&mut out, "sieve_cache_hits_total", "Cache hits", self.cache_hits());
        counter(&mut out, "sieve_cache_misses_total", "Cache misses", self.cache_misses());
        counter(&mut out, "sieve_cache_writes_total", "Cache writes", self.cache_writes());
        counter(&mut out, "sieve_cache_errors_total", "Cache store failures", self.cache_errors());
        counter(&mut out, "sieve_query_timeouts_total", "Query timeouts", self.timeouts());
        counter(
            &mut out,
            "sieve_validation_failures_total",
            "Rejected requests",
            self.validation_failures(),
        );
        counter(
            &mut out,
            "sieve_datastore_errors_total",
            "Datastore failures",
            self.datastore_errors(),
        );

        self.query_latency
            .write_prometheus(&mut out, "sieve_query_duration_seconds", "Listing query latency");
        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("query_count", &self.query_count())
            .field("cache_hits", &self.cache_hits())
            .field("cache_misses", &self.cache_misses())
            .field("timeouts", &self.timeouts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_queries() {
        let metrics = MetricsRegistry::new();
        metrics.record_query("Invoice", 10, Duration::from_millis(3));
        metrics.record_query("Invoice", 5, Duration::from_millis(1));
        metrics.record_query("Product", 0, Duration::from_millis(2));

        assert_eq!(metrics.query_count(), 3);
        assert_eq!(metrics.rows_returned(), 15);
        let by_entity = metrics.queries_by_entity();
        assert_eq!(by_entity.get("Invoice"), Some(&2));
        assert_eq!(by_entity.get("Product"), Some(&1));
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = MetricsRegistry::new();
        assert_eq!(metrics.cache_hit_rate(), 0.0);
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_cache_hit();
        assert!((metrics.cache_hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsRegistry::new();
        metrics.record_query("Invoice", 1, Duration::from_millis(1));
        metrics.record_timeout();
        metrics.record_validation_failure();

        let text = metrics.to_prometheus();
        assert!(text.contains("sieve_queries_total 1"));
        assert!(text.contains("sieve_entity_queries_total{entity=\"Invoice\"} 1"));
        assert!(text.contains("sieve_query_timeouts_total 1"));
        assert!(text.contains("sieve_validation_failures_total 1"));
        assert!(text.contains("# TYPE sieve_query_duration_seconds histogram"));
    }
}
