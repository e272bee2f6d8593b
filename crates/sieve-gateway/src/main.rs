//! Sieve HTTP gateway binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sieve_core::{Catalog, MemoryCacheStore, MemoryStore, QueryEngine};
use sieve_gateway::{create_router, AppState, Args, GatewayConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = GatewayConfig::from(&args);
    let engine_config = args.engine_config();

    if engine_config.default_limit > engine_config.max_limit {
        anyhow::bail!("default_limit cannot exceed max_limit");
    }

    let catalog = Catalog::load(&config.catalog_path)
        .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;
    let store = match &config.seed_path {
        Some(path) => MemoryStore::load(path)
            .with_context(|| format!("loading seed data {}", path.display()))?,
        None => MemoryStore::new(),
    };
    info!(
        entities = catalog.len(),
        listen = %config.listen_addr,
        cache_enabled = engine_config.cache_enabled,
        execution_path = %engine_config.execution_path,
        "Starting Sieve gateway"
    );

    let engine = QueryEngine::new(Arc::new(store), catalog, engine_config)
        .with_cache(Arc::new(MemoryCacheStore::new()));

    // Create application state
    let state = AppState::new(engine, config.clone());

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Gateway listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
