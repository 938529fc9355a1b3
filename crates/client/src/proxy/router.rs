//! Request routing: bypass, or network-first with cache fallback.
//!
//! ### Network-first
//! - Live responses are always returned as-is.
//! - Cacheable responses are mirrored into the active store by a background
//!   task, so the caller never waits on the write.
//! - The active store is resolved again once the network has answered, so a
//!   request that overlaps an activation uses the new generation's store.
//!   A write that still lands after its store was collected is dropped.
//!
//! ### Fallback chain on network failure
//! 1. The stored snapshot for the request key.
//! 2. For navigations only, the stored entry document.
//! 3. `NoFallbackAvailable`.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::lifecycle::LifecycleController;
use super::policy::{BypassPolicy, BypassReason, Route};
use crate::fetch::{InterceptedRequest, Network, NetworkResponse, ResponseKind};
use offgrid_core::{Error, RequestKey, ResponseSnapshot, VersionedStore};

/// Where a proxied response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    ShellFallback,
    Passthrough,
}

/// A response supplied by the proxy.
///
/// Live responses pass through [`NetworkResponse::to_snapshot`], the same
/// conversion used for storage, so a live and a cached answer look alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub source: ResponseSource,
    pub snapshot: ResponseSnapshot,
}

/// Result of offering a request to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intercept {
    /// The proxy supplies this response.
    Respond(ProxyResponse),
    /// The proxy declines; default network handling applies.
    Passthrough(BypassReason),
}

pub struct Router {
    network: Arc<dyn Network>,
    policy: BypassPolicy,
    entry_document: RequestKey,
    pending: Mutex<JoinSet<()>>,
}

impl Router {
    pub fn new(network: Arc<dyn Network>, policy: BypassPolicy, entry_document: RequestKey) -> Self {
        Self { network, policy, entry_document, pending: Mutex::new(JoinSet::new()) }
    }

    /// Route one request through the generation that is currently active.
    pub async fn handle(&self, request: &InterceptedRequest, lifecycle: &LifecycleController) -> Result<Intercept, Error> {
        if let Route::Bypass(reason) = self.policy.classify(request) {
            tracing::debug!(method = %request.method, url = %request.url, ?reason, "bypassing proxy");
            return Ok(Intercept::Passthrough(reason));
        }

        if lifecycle.active().await.is_none() {
            tracing::debug!(url = %request.url, "no active generation; bypassing proxy");
            return Ok(Intercept::Passthrough(BypassReason::Inactive));
        }

        self.network_first(request, lifecycle).await.map(Intercept::Respond)
    }

    async fn network_first(
        &self, request: &InterceptedRequest, lifecycle: &LifecycleController,
    ) -> Result<ProxyResponse, Error> {
        let key = request.key();
        let outcome = self.network.fetch(request).await;

        // An activation may have finished while the fetch was in flight.
        let Some(store) = lifecycle.active_store().await else {
            return Err(Error::Lifecycle("active generation disappeared during a request".into()));
        };

        match outcome {
            Ok(response) => {
                let snapshot = response.to_snapshot();
                if is_cacheable(request, &response) {
                    self.mirror(store, key, snapshot.clone()).await;
                }
                Ok(ProxyResponse { source: ResponseSource::Network, snapshot })
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network failed; trying cache");

                if let Some(snapshot) = lookup(&store, &key).await {
                    return Ok(ProxyResponse { source: ResponseSource::Cache, snapshot });
                }

                if request.is_navigation()
                    && let Some(snapshot) = lookup(&store, &self.entry_document).await
                {
                    tracing::debug!(url = %request.url, "serving entry document for failed navigation");
                    return Ok(ProxyResponse { source: ResponseSource::ShellFallback, snapshot });
                }

                Err(Error::NoFallbackAvailable(format!("{} {}", request.method, request.url)))
            }
        }
    }

    async fn mirror(&self, store: VersionedStore, key: RequestKey, snapshot: ResponseSnapshot) {
        let mut pending = self.pending.lock().await;
        while pending.try_join_next().is_some() {}

        pending.spawn(async move {
            match store.write(&key, &snapshot).await {
                Ok(true) => tracing::debug!(store = store.version(), url = %key.url, "cached response"),
                Ok(false) => tracing::debug!(store = store.version(), url = %key.url, "store was collected; response not cached"),
                Err(e) => tracing::warn!(store = store.version(), error = %e, "failed to cache response"),
            }
        });
    }

    /// Wait for every background cache write started so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.pending.lock().await);
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "cache write task aborted");
            }
        }
    }
}

/// Same-origin, successful, complete response to a GET.
fn is_cacheable(request: &InterceptedRequest, response: &NetworkResponse) -> bool {
    request.is_get()
        && response.kind == ResponseKind::Basic
        && response.status.is_success()
        && response.status != StatusCode::PARTIAL_CONTENT
}

async fn lookup(store: &VersionedStore, key: &RequestKey) -> Option<ResponseSnapshot> {
    match store.read(key).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(store = store.version(), url = %key.url, error = %e, "cache lookup failed");
            None
        }
    }
}
