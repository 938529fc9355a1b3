//! proxy_fetch tool implementation.
//!
//! Offers one request to the offline proxy and reports where the answer came from.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offgrid_client::{OfflineProxy, RequestMode, ResponseSource};

use super::json_result;

fn default_method() -> String {
    "GET".to_string()
}

/// Parameters for the proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a top-level page navigation.
    #[serde(default)]
    pub navigate: bool,
}

/// Output from the proxy_fetch tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ProxyFetchOutput {
    pub url: String,
    pub method: String,
    pub source: ResponseSource,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    pub body_bytes: usize,
}

/// Implementation of the proxy_fetch tool.
pub async fn fetch_impl(proxy: &OfflineProxy, params: ProxyFetchParams) -> Result<CallToolResult, McpError> {
    let mode = if params.navigate { RequestMode::Navigate } else { RequestMode::Subresource };
    let request = proxy.request(&params.method, &params.url, mode)?;

    let response = proxy.fetch(&request).await?;
    let snapshot = response.snapshot;

    let output = ProxyFetchOutput {
        url: request.url.to_string(),
        method: request.method,
        source: response.source,
        status: snapshot.status,
        body: String::from_utf8_lossy(&snapshot.body).into_owned(),
        body_bytes: snapshot.body.len(),
        headers: snapshot.headers,
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{output, proxy};

    fn params(url: &str) -> ProxyFetchParams {
        serde_json::from_value(serde_json::json!({ "url": url })).unwrap()
    }

    #[test]
    fn test_params_defaults() {
        let params = params("/");
        assert_eq!(params.method, "GET");
        assert!(!params.navigate);
    }

    #[tokio::test]
    async fn test_fetch_from_network() {
        let (_db, proxy) = proxy(true).await;
        proxy.register().await.unwrap();

        let result = fetch_impl(&proxy, params("/reports")).await.unwrap();
        proxy.flush().await;

        let out = output(&result);
        assert_eq!(out["url"], "https://app.test/reports");
        assert_eq!(out["source"], "network");
        assert_eq!(out["status"], 200);
        assert_eq!(out["body"], "GET /reports");
        assert_eq!(out["body_bytes"], 12);
    }

    #[tokio::test]
    async fn test_bypass_is_passthrough() {
        let (_db, proxy) = proxy(true).await;
        proxy.register().await.unwrap();

        let mut post = params("/api/orders");
        post.method = "post".into();
        let out = output(&fetch_impl(&proxy, post).await.unwrap());

        assert_eq!(out["source"], "passthrough");
        assert_eq!(out["method"], "POST");
    }

    #[tokio::test]
    async fn test_offline_without_generation_fails() {
        let (_db, proxy) = proxy(false).await;

        let err = fetch_impl(&proxy, params("/")).await.unwrap_err();
        assert_eq!(err.code.0, -32023);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let (_db, proxy) = proxy(true).await;

        let err = fetch_impl(&proxy, params("ftp://files.test/a")).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
    }
}
