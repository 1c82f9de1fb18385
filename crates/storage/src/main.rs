//! prerender-storage entry point.
//!
//! Serves the shared page cache over HTTP until interrupted.

use std::sync::Arc;

use anyhow::Result;
use prerender_core::{AppConfig, LocalCache};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let cache = Arc::new(LocalCache::new(config.cache_settings()));

    let listener = tokio::net::TcpListener::bind(&config.storage_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        capacity = config.cache_capacity,
        ttl_secs = config.cache_ttl_secs,
        "Starting prerender storage service"
    );

    axum::serve(listener, prerender_storage::router(cache))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("storage service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
