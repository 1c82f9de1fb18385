//! Request executor: canonicalize, serve from cache, or render and store.

use std::sync::Arc;
use std::time::Instant;

use prerender_core::archive::{self, ArchiveMeta};
use prerender_core::cache::compute_cache_key;
use prerender_core::{Cacher, Error, canonicalize};

use crate::render::Renderer;

/// Serves rendered pages through the cache.
#[derive(Clone)]
pub struct Executor {
    renderer: Arc<dyn Renderer>,
    cache: Arc<dyn Cacher>,
}

impl Executor {
    pub fn new(renderer: Arc<dyn Renderer>, cache: Arc<dyn Cacher>) -> Self {
        Self { renderer, cache }
    }

    pub fn cache(&self) -> &Arc<dyn Cacher> {
        &self.cache
    }

    /// Return the rendered HTML of `raw_url`.
    ///
    /// A cache hit never reaches the renderer unless `force` is set. After a
    /// render the page is stored best-effort: a failed write is logged and the
    /// HTML is still returned.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` or `Error::RedirectRequired` from canonicalization,
    ///   before the cache or renderer is touched.
    /// - Render errors, unchanged.
    pub async fn execute(&self, raw_url: &str, force: bool) -> Result<String, Error> {
        let canonical = canonicalize(raw_url)?;
        let key = compute_cache_key(&canonical.key);

        if !force {
            match self.cache.get(&key).await {
                Ok(blob) => match archive::decompress(&blob) {
                    Ok(html) => {
                        tracing::debug!(url = %canonical.key, key = %key, "cache hit");
                        return Ok(html);
                    }
                    Err(e) => tracing::warn!(url = %canonical.key, key = %key, error = %e, "corrupt cache entry, rendering again"),
                },
                Err(e) if e.is_miss() => tracing::debug!(url = %canonical.key, key = %key, "cache miss"),
                Err(e) => tracing::warn!(url = %canonical.key, key = %key, error = %e, "cache read failed, rendering"),
            }
        }

        let start = Instant::now();
        let html = self.renderer.render(&canonical.navigable).await?;
        tracing::info!(
            url = %canonical.key,
            force,
            bytes = html.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "page rendered"
        );

        let meta = ArchiveMeta { name: Some(&canonical.key), comment: None };
        match archive::compress(&html, meta) {
            Ok(blob) => {
                if let Err(e) = self.cache.put(&key, blob).await {
                    tracing::warn!(url = %canonical.key, key = %key, error = %e, "cache write failed");
                }
            }
            Err(e) => tracing::warn!(url = %canonical.key, error = %e, "page compression failed, not cached"),
        }

        Ok(html)
    }
}
