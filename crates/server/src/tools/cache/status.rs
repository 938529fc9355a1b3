//! cache_status tool implementation.
//!
//! Reports the registration state and every versioned store.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use offgrid_client::OfflineProxy;

use crate::tools::json_result;

/// Implementation of the cache_status tool.
pub async fn status_impl(proxy: &OfflineProxy) -> Result<CallToolResult, McpError> {
    let status = proxy.status().await?;
    json_result(&status)
}
