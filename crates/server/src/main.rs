//! prerender server entry point.
//!
//! Boots the MCP server on stdio transport with the configured cache backend
//! and browser renderer. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use prerender_client::render::chromium::ChromiumLauncher;
use prerender_client::remote::{DEFAULT_TIMEOUT, RemoteCache};
use prerender_client::{BrowserRenderer, DockerProcess, Executor, ManagedProcess, RenderPolicy, warm};
use prerender_core::config::CacheBackend;
use prerender_core::{AppConfig, Cacher, LocalCache};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(backend = ?config.cache_backend, discovery_url = %config.discovery_url, "Starting prerender server on stdio transport");

    let cache = build_cache(&config)?;
    let process = managed_process(&config);
    let launcher = Arc::new(ChromiumLauncher::new(config.discovery_url.clone()));
    let renderer = Arc::new(BrowserRenderer::new(RenderPolicy::from_config(&config), launcher, process));
    renderer.prepare().await;
    let executor = Executor::new(renderer.clone(), cache);

    if config.warm_on_start && !config.warm_pages.is_empty() {
        let executor = executor.clone();
        let pages = config.warm_pages.clone();
        let concurrency = config.warm_concurrency;
        tokio::spawn(async move {
            warm(&executor, &pages, false, concurrency).await;
        });
    }

    let handler = handler::PrerenderServer::new(executor);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    renderer.shutdown();

    Ok(())
}

fn build_cache(config: &AppConfig) -> Result<Arc<dyn Cacher>> {
    match config.cache_backend {
        CacheBackend::Local => {
            tracing::info!(capacity = config.cache_capacity, ttl_secs = config.cache_ttl_secs, "using local page cache");
            Ok(Arc::new(LocalCache::new(config.cache_settings())))
        }
        CacheBackend::Remote => {
            tracing::info!(url = %config.remote_cache_url, "using remote page cache");
            Ok(Arc::new(RemoteCache::new(&config.remote_cache_url, DEFAULT_TIMEOUT)?))
        }
    }
}

/// The browser container, if one is configured. The renderer checks it at boot.
fn managed_process(config: &AppConfig) -> Option<Arc<dyn ManagedProcess>> {
    let container = config.managed_container.as_deref()?;
    Some(Arc::new(DockerProcess::new(&config.docker_command, container)))
}
