//! Engine metrics.
//!
//! A [`MetricsRegistry`] is owned by each engine and exported in Prometheus
//! text format by the gateway's `/metrics` route.

mod histogram;
mod registry;

pub use histogram::Histogram;
pub use registry::MetricsRegistry;
