//! Gateway configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use sieve_core::config::{
    DEFAULT_CACHE_TTL, DEFAULT_LIMIT, DEFAULT_MAX_LIMIT, DEFAULT_MAX_OR_CLAUSES,
    DEFAULT_MAX_POPULATE_DEPTH, DEFAULT_QUERY_TIMEOUT,
};
use sieve_core::EngineConfig;
use sieve_proto::ExecutionPath;

/// Datastore path selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PathArg {
    /// Plain find with sort, skip and limit.
    Find,
    /// Aggregation pipeline.
    Aggregate,
}

impl From<PathArg> for ExecutionPath {
    fn from(arg: PathArg) -> Self {
        match arg {
            PathArg::Find => ExecutionPath::Find,
            PathArg::Aggregate => ExecutionPath::Aggregate,
        }
    }
}

/// Sieve HTTP gateway command line arguments.
#[derive(Debug, Parser)]
#[command(name = "sieve-gateway")]
#[command(about = "HTTP gateway for multi-tenant entity listings")]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// JSON file with the entity catalog.
    #[arg(short, long)]
    pub catalog: PathBuf,

    /// JSON file with seed documents, keyed by entity name.
    #[arg(short, long)]
    pub seed: Option<PathBuf>,

    /// Page size when a request gives none.
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub default_limit: u64,

    /// Larger page sizes are clamped to this.
    #[arg(long, default_value_t = DEFAULT_MAX_LIMIT)]
    pub max_limit: u64,

    /// Maximum values in one `[or]` list.
    #[arg(long, default_value_t = DEFAULT_MAX_OR_CLAUSES)]
    pub max_or_clauses: usize,

    /// Maximum relation depth for `populate`.
    #[arg(long, default_value_t = DEFAULT_MAX_POPULATE_DEPTH)]
    pub max_populate_depth: usize,

    /// Lifetime (seconds) of cached responses.
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL.as_secs())]
    pub cache_ttl_secs: u64,

    /// Budget (ms) for datastore work per request.
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT.as_millis() as u64)]
    pub query_timeout_ms: u64,

    /// Serve every request from the datastore.
    #[arg(long)]
    pub no_cache: bool,

    /// Datastore path used for listings.
    #[arg(long, value_enum, default_value_t = PathArg::Find)]
    pub execution_path: PathArg,
}

impl Args {
    /// Engine settings derived from the arguments.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_limits(self.default_limit, self.max_limit)
            .with_max_or_clauses(self.max_or_clauses)
            .with_max_populate_depth(self.max_populate_depth)
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_cache_enabled(!self.no_cache)
            .with_query_timeout(Duration::from_millis(self.query_timeout_ms))
            .with_execution_path(self.execution_path.into())
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,
    /// Entity catalog file.
    pub catalog_path: PathBuf,
    /// Seed data file, if any.
    pub seed_path: Option<PathBuf>,
}

impl From<&Args> for GatewayConfig {
    fn from(args: &Args) -> Self {
        Self {
            listen_addr: args.listen.clone(),
            catalog_path: args.catalog.clone(),
            seed_path: args.seed.clone(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            catalog_path: PathBuf::from("catalog.json"),
            seed_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_to_engine_config() {
        let args = Args::parse_from([
            "sieve-gateway",
            "--catalog",
            "entities.json",
            "--max-limit",
            "50",
            "--no-cache",
            "--execution-path",
            "aggregate",
        ]);
        let engine = args.engine_config();
        assert_eq!(engine.max_limit, 50);
        assert_eq!(engine.default_limit, DEFAULT_LIMIT);
        assert!(!engine.cache_enabled);
        assert_eq!(engine.execution_path, ExecutionPath::Aggregate);

        let gateway = GatewayConfig::from(&args);
        assert_eq!(gateway.catalog_path, PathBuf::from("entities.json"));
        assert_eq!(gateway.listen_addr, "0.0.0.0:8080");
        assert!(gateway.seed_path.is_none());
    }
}
