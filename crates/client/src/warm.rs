//! Cache-warming sweep over a list of page URLs.

use futures_util::{StreamExt, stream};

use crate::executor::Executor;

/// Outcome of one warming sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub rendered: usize,
    pub failed: usize,
    /// Cache length after the sweep, if the backend could report it.
    pub cache_len: Option<usize>,
}

/// Execute every page with at most `concurrency` requests in flight.
///
/// Failures are logged and counted; they never stop the sweep. Overlapping
/// sweeps are safe but redundant.
pub async fn warm(executor: &Executor, pages: &[String], force: bool, concurrency: usize) -> WarmReport {
    let concurrency = concurrency.max(1);
    tracing::info!(pages = pages.len(), concurrency, force, "cache warming started");

    // owned items keep the sweep future `Send`, so it can be spawned
    let outcomes: Vec<bool> = stream::iter(pages.iter().cloned())
        .map(move |page: String| async move {
            match executor.execute(&page, force).await {
                Ok(html) => {
                    tracing::debug!(url = %page, bytes = html.len(), "warmed page");
                    true
                }
                Err(e) => {
                    tracing::warn!(url = %page, error = %e, "warming page failed");
                    false
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let rendered = outcomes.iter().filter(|ok| **ok).count();
    let cache_len = match executor.cache().len().await {
        Ok(len) => Some(len),
        Err(e) => {
            tracing::warn!(error = %e, "cache length unavailable after warming");
            None
        }
    };

    let report = WarmReport { rendered, failed: outcomes.len() - rendered, cache_len };
    tracing::info!(rendered = report.rendered, failed = report.failed, cache_len = ?report.cache_len, "cache warming finished");
    report
}
