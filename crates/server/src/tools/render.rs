//! render tool implementation.
//!
//! Returns the serialized HTML of a page, from cache when possible.

use prerender_client::Executor;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input parameters for the render tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderParams {
    /// The page URL. A missing scheme defaults to https.
    pub url: String,

    /// Render even if the page is cached, replacing the cached copy.
    #[serde(default)]
    pub force: bool,
}

/// Implementation of the render tool.
///
/// A non-canonical URL fails with the redirect location in the error message.
pub async fn render_impl(executor: &Executor, params: RenderParams) -> Result<CallToolResult, McpError> {
    tracing::debug!(url = %params.url, force = params.force, "render requested");
    let html = executor.execute(&params.url, params.force).await?;
    Ok(CallToolResult::success(vec![Content::text(html)]))
}
