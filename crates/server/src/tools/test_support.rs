//! Scripted networks for tool tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, header};
use url::Url;

use offgrid_client::{InterceptedRequest, Network, NetworkResponse, OfflineProxy, ProxySettings, ResponseKind};
use offgrid_core::{CacheDb, Error};

pub(crate) const ORIGIN: &str = "https://app.test";

/// Answers every request with `200 <METHOD> <path>`, or fails them all when offline.
pub(crate) struct EchoNetwork {
    pub(crate) online: bool,
}

#[async_trait]
impl Network for EchoNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<NetworkResponse, Error> {
        if !self.online {
            return Err(Error::NetworkFailed(format!("offline: {}", request.url)));
        }

        let body = format!("{} {}", request.method, request.url.path());
        Ok(NetworkResponse {
            url: request.url.clone(),
            status: StatusCode::OK,
            headers: header::HeaderMap::new(),
            body: Bytes::from(body),
            kind: ResponseKind::Basic,
            fetch_ms: 0,
        })
    }
}

pub(crate) fn settings(version: &str) -> ProxySettings {
    ProxySettings {
        version: version.to_string(),
        origin: Url::parse(ORIGIN).unwrap(),
        bypass_hosts: vec!["supabase.co".into()],
        shell_manifest: vec!["/".into(), "/index.html".into(), "/manifest.json".into()],
        entry_document: "/index.html".into(),
        skip_waiting: false,
    }
}

pub(crate) async fn proxy(online: bool) -> (CacheDb, Arc<OfflineProxy>) {
    let db = CacheDb::open_in_memory().await.unwrap();
    let proxy = OfflineProxy::new(db.clone(), Arc::new(EchoNetwork { online }), settings("v1")).unwrap();
    (db, Arc::new(proxy))
}

/// Parse the JSON text content of a successful tool result.
pub(crate) fn output(result: &rmcp::model::CallToolResult) -> serde_json::Value {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
