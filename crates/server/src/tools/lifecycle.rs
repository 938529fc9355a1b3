//! Lifecycle tools: install, activate, control messages and session tracking.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offgrid_client::{ControlMessage, Generation, OfflineProxy};
use offgrid_core::Error;

use super::json_result;

/// Parameters for the proxy_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyMessageParams {
    /// Message type. Only `TAKE_OVER` has an effect.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Parameters for the proxy_session tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxySessionParams {
    /// `open` or `close`.
    pub action: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GenerationOutput {
    pub generation: Generation,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MessageOutput {
    #[serde(rename = "type")]
    pub kind: String,
    /// False when the message was ignored.
    pub handled: bool,
    pub generation: Option<Generation>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SessionOutput {
    pub action: String,
    pub sessions: usize,
    pub active: Option<Generation>,
    pub waiting: Option<Generation>,
}

pub async fn install_impl(proxy: &OfflineProxy) -> Result<CallToolResult, McpError> {
    let generation = proxy.install().await?;
    json_result(&GenerationOutput { generation })
}

pub async fn activate_impl(proxy: &OfflineProxy) -> Result<CallToolResult, McpError> {
    let generation = proxy.activate().await?;
    json_result(&GenerationOutput { generation })
}

pub async fn message_impl(proxy: &OfflineProxy, params: ProxyMessageParams) -> Result<CallToolResult, McpError> {
    let message = ControlMessage::new(params.kind);
    let generation = proxy.on_control_message(&message).await?;

    json_result(&MessageOutput { handled: message.is_take_over(), kind: message.kind, generation })
}

pub async fn session_impl(proxy: &OfflineProxy, params: ProxySessionParams) -> Result<CallToolResult, McpError> {
    let sessions = match params.action.trim().to_ascii_lowercase().as_str() {
        "open" => proxy.session_opened().await,
        "close" => proxy.session_closed().await?,
        other => return Err(Error::InvalidInput(format!("unknown session action '{other}', expected open or close")).into()),
    };

    let lifecycle = proxy.lifecycle();
    json_result(&SessionOutput {
        action: params.action,
        sessions,
        active: lifecycle.active().await,
        waiting: lifecycle.waiting().await,
    })
}
