//! MCP server handler implementation.
//!
//! Each runtime hook of the offline proxy is exposed as one tool.
use std::sync::Arc;

use crate::tools::cache::status_impl;
use crate::tools::lifecycle::{ProxyMessageParams, ProxySessionParams, activate_impl, install_impl, message_impl, session_impl};
use crate::tools::proxy_fetch::{ProxyFetchParams, fetch_impl};
use offgrid_client::OfflineProxy;

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

/// The main MCP server handler for offgrid.
#[derive(Clone)]
pub struct OffgridServer {
    proxy: Arc<OfflineProxy>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
#[tool_router]
impl OffgridServer {
    /// Create a new server handler around a registered proxy.
    pub fn new(proxy: Arc<OfflineProxy>) -> Self {
        Self { proxy, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Fetch a URL through the offline proxy. Non-GET, always-network hosts and websockets go straight to the network; everything else is network-first with cache fallback."
    )]
    async fn proxy_fetch(&self, params: Parameters<ProxyFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.proxy, params.0).await
    }

    #[tool(description = "Install this build's cache generation by fetching the shell manifest as one atomic batch.")]
    async fn proxy_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.proxy).await
    }

    #[tool(description = "Activate the waiting generation: delete stale stores and take over open sessions.")]
    async fn proxy_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.proxy).await
    }

    #[tool(description = "Post a control message. type=TAKE_OVER activates a waiting generation; other types are ignored.")]
    async fn proxy_message(&self, params: Parameters<ProxyMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.proxy, params.0).await
    }

    #[tool(description = "Record an application session opening or closing (action: open | close).")]
    async fn proxy_session(&self, params: Parameters<ProxySessionParams>) -> Result<CallToolResult, McpError> {
        session_impl(&self.proxy, params.0).await
    }

    #[tool(description = "Show the active and waiting generations, open sessions and every cache store.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.proxy).await
    }
}

impl ServerHandler for OffgridServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offgrid".into(),
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
