//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache_len::{CacheLenParams, cache_len_impl};
use crate::tools::render::{RenderParams, render_impl};

use prerender_client::Executor;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for prerender.
#[derive(Clone)]
pub struct PrerenderServer {
    tool_router: ToolRouter<Self>,
    executor: Executor,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl PrerenderServer {
    /// Create a new server handler around a request executor.
    pub fn new(executor: Executor) -> Self {
        Self { tool_router: Self::tool_router(), executor }
    }

    /// Render a page in a headless browser.
    ///
    /// Cached pages are returned without rendering unless `force` is set.
    #[tool(
        description = "Render a JavaScript-heavy page in a headless browser and return its serialized HTML. Served from cache unless force is true. URLs with a trailing slash fail with the canonical redirect location."
    )]
    async fn render(&self, params: Parameters<RenderParams>) -> Result<CallToolResult, McpError> {
        render_impl(&self.executor, params.0).await
    }

    #[tool(description = "Number of live entries in the page cache.")]
    async fn cache_len(&self, _params: Parameters<CacheLenParams>) -> Result<CallToolResult, McpError> {
        cache_len_impl(self.executor.cache().as_ref()).await
    }
}

impl ServerHandler for PrerenderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "prerender".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prerender_client::Renderer;
    use prerender_core::{Error, LocalCache};
    use std::sync::Arc;

    struct NoopRenderer;

    #[async_trait::async_trait]
    impl Renderer for NoopRenderer {
        async fn render(&self, _url: &url::Url) -> Result<String, Error> {
            Ok("<html></html>".into())
        }
    }

    #[test]
    fn test_tools_listed() {
        let server = PrerenderServer::new(Executor::new(Arc::new(NoopRenderer), Arc::new(LocalCache::default())));
        let names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();

        assert!(names.contains(&"render".to_string()));
        assert!(names.contains(&"cache_len".to_string()));
    }

    #[test]
    fn test_server_info() {
        let server = PrerenderServer::new(Executor::new(Arc::new(NoopRenderer), Arc::new(LocalCache::default())));
        assert_eq!(server.get_info().server_info.name, "prerender");
    }
}
