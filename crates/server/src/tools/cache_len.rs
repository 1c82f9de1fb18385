//! cache_len tool implementation.
//!
//! Reports the number of live cache entries.

use prerender_core::{Cacher, Error};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The cache_len tool takes no parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheLenParams {}

/// Output from the cache_len tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheLenOutput {
    pub length: usize,
}

/// Implementation of the cache_len tool.
pub async fn cache_len_impl(cache: &dyn Cacher) -> Result<CallToolResult, McpError> {
    let output = CacheLenOutput { length: cache.len().await? };
    let json = serde_json::to_string(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize cache length: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prerender_core::LocalCache;
    use prerender_core::cache::compute_cache_key;

    #[tokio::test]
    async fn test_cache_len_impl() {
        let cache = LocalCache::default();
        cache.put(&compute_cache_key("x.test/a"), vec![1]).await.unwrap();
        cache.put(&compute_cache_key("x.test/b"), vec![2]).await.unwrap();

        let result = cache_len_impl(&cache).await.unwrap();

        let text = result.content[0].as_text().unwrap();
        assert_eq!(text.text, r#"{"length":2}"#);
    }
}
