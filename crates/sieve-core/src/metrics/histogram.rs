//! Fixed-bucket latency histogram.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bucket upper bounds in microseconds: 250us up to 10s.
const LATENCY_BOUNDS_US: [u64; 11] = [
    250, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 500_000, 1_000_000, 10_000_000,
];

/// Lock-free latency histogram.
///
/// Bucket counts are per bucket, not cumulative; observations above the last
/// bound land in an overflow slot.
pub struct Histogram {
    bounds: &'static [u64],
    counts: Vec<AtomicU64>,
    sum_us: AtomicU64,
    count: AtomicU64,
    max_us: AtomicU64,
}

impl Histogram {
    /// Histogram with query latency buckets.
    pub fn latency() -> Self {
        Self {
            bounds: &LATENCY_BOUNDS_US,
            counts: (0..=LATENCY_BOUNDS_US.len())
                .map(|_| AtomicU64::new(0))
                .collect(),
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
        }
    }

    /// Record a duration.
    pub fn observe(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.observe_us(us);
    }

    /// Record a value in microseconds.
    pub fn observe_us(&self, us: u64) {
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);

        let slot = self
            .bounds
            .iter()
            .position(|&bound| us <= bound)
            .unwrap_or(self.bounds.len());
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observations in microseconds.
    pub fn sum_us(&self) -> u64 {
        self.sum_us.load(Ordering::Relaxed)
    }

    /// Largest observation in microseconds.
    pub fn max_us(&self) -> u64 {
        self.max_us.load(Ordering::Relaxed)
    }

    /// Mean observation in microseconds.
    pub fn avg_us(&self) -> u64 {
        match self.count() {
            0 => 0,
            n => self.sum_us() / n,
        }
    }

    /// Approximate percentile (`0.5` for the median).
    ///
    /// Returns the upper bound of the bucket holding the target rank, or the
    /// observed maximum when the rank falls in the overflow slot.
    pub fn percentile_us(&self, p: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }
        let rank = ((total as f64) * p.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (slot, count) in self.counts.iter().enumerate() {
            seen += count.load(Ordering::Relaxed);
            if seen >= rank {
                return self.bounds.get(slot).copied().unwrap_or_else(|| self.max_us());
            }
        }
        self.max_us()
    }

    /// Append this histogram in Prometheus text format, in seconds.
    pub fn write_prometheus(&self, out: &mut String, name: &str, help: &str) {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} histogram", name);
        let mut cumulative = 0;
        for (slot, bound) in self.bounds.iter().enumerate() {
            cumulative += self.counts[slot].load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "{}_bucket{{le=\"{}\"}} {}",
                name,
                *bound as f64 / 1_000_000.0,
                cumulative
            );
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, self.count());
        let _ = writeln!(out, "{}_sum {}", name, self.sum_us() as f64 / 1_000_000.0);
        let _ = writeln!(out, "{}_count {}", name, self.count());
    }

    /// Clear all observations.
    pub fn reset(&self) {
        self.sum_us.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        self.max_us.store(0, Ordering::Relaxed);
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::latency()
    }
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("count", &self.count())
            .field("avg_us", &self.avg_us())
            .field("max_us", &self.max_us())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let h = Histogram::latency();
        assert_eq!(h.count(), 0);
        assert_eq!(h.avg_us(), 0);
        assert_eq!(h.percentile_us(0.99), 0);
    }

    #[test]
    fn test_observe_and_percentiles() {
        let h = Histogram::latency();
        for _ in 0..9 {
            h.observe_us(800);
        }
        h.observe(Duration::from_millis(40));

        assert_eq!(h.count(), 10);
        assert_eq!(h.max_us(), 40_000);
        assert_eq!(h.percentile_us(0.5), 1_000);
        assert_eq!(h.percentile_us(1.0), 50_000);
    }

    #[test]
    fn test_overflow_uses_max() {
        let h = Histogram::latency();
        h.observe_us(30_000_000);
        assert_eq!(h.percentile_us(0.5), 30_000_000);
    }

    #[test]
    fn test_prometheus_buckets_are_cumulative() {
        let h = Histogram::latency();
        h.observe_us(100);
        h.observe_us(2_000);
        let mut out = String::new();
        h.write_prometheus(&mut out, "sieve_query_seconds", "Query latency");
        assert!(out.contains("sieve_query_seconds_bucket{le=\"0.00025\"} 1"));
        assert!(out.contains("sieve_query_seconds_bucket{le=\"0.0025\"} 2"));
        assert!(out.contains("sieve_query_seconds_count 2"));
    }

    #[test]
    fn test_reset() {
        let h = Histogram::latency();
        h.observe_us(10);
        h.reset();
        assert_eq!(h.count(), 0);
        assert_eq!(h.max_us(), 0);
    }
}
