//! The offline proxy: one process-wide value that owns the lifecycle
//! controller and the router, and is the registration point for every
//! runtime hook (install, activate, intercept, control messages).

pub mod control;
pub mod lifecycle;
pub mod policy;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use serde::Serialize;
use url::Url;

pub use control::{ControlMessage, TAKE_OVER};
pub use lifecycle::{Generation, LifecycleController, LifecycleState, ShellManifest};
pub use policy::{BypassPolicy, BypassReason, HostPattern, Route};
pub use router::{Intercept, ProxyResponse, ResponseSource, Router};

use crate::fetch::{InterceptedRequest, Network, RequestMode, canonicalize};
use offgrid_core::cache::StoreSummary;
use offgrid_core::{AppConfig, CacheDb, Error, RequestKey, current_version};

/// Deployment settings for the proxy.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Generation this process installs.
    pub version: String,
    pub origin: Url,
    pub bypass_hosts: Vec<String>,
    pub shell_manifest: Vec<String>,
    pub entry_document: String,
    pub skip_waiting: bool,
}

impl ProxySettings {
    /// Settings for the build's current version from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            version: current_version().to_string(),
            origin,
            bypass_hosts: config.bypass_hosts.clone(),
            shell_manifest: config.shell_manifest.clone(),
            entry_document: config.entry_document.clone(),
            skip_waiting: config.skip_waiting,
        })
    }
}

/// Snapshot of the proxy's registration and stores.
#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
pub struct ProxyStatus {
    pub version: String,
    pub installing: Option<Generation>,
    pub active: Option<Generation>,
    pub waiting: Option<Generation>,
    /// Most recently retired generation.
    pub redundant: Option<Generation>,
    pub sessions: usize,
    pub stores: Vec<StoreSummary>,
}

pub struct OfflineProxy {
    db: CacheDb,
    network: Arc<dyn Network>,
    lifecycle: LifecycleController,
    router: Router,
    origin: Url,
    version: String,
}

impl OfflineProxy {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, settings: ProxySettings) -> Result<Self, Error> {
        let manifest = ShellManifest::new(&settings.origin, &settings.shell_manifest)?;
        let entry = canonicalize(&settings.entry_document, &settings.origin)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", settings.entry_document)))?;
        let policy = BypassPolicy::new(&settings.bypass_hosts)?;

        let lifecycle = LifecycleController::new(db.clone(), network.clone(), manifest, settings.skip_waiting);
        let router = Router::new(network.clone(), policy, RequestKey::get(entry.as_str()));

        Ok(Self { db, network, lifecycle, router, origin: settings.origin, version: settings.version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// Registration: resume the persisted generation, then install this build's.
    pub async fn register(&self) -> Result<Generation, Error> {
        self.lifecycle.restore().await?;
        self.install().await
    }

    pub async fn install(&self) -> Result<Generation, Error> {
        self.lifecycle.install(&self.version).await
    }

    pub async fn activate(&self) -> Result<Generation, Error> {
        self.lifecycle.activate().await
    }

    pub async fn on_control_message(&self, message: &ControlMessage) -> Result<Option<Generation>, Error> {
        self.lifecycle.on_control_message(message).await
    }

    pub async fn session_opened(&self) -> usize {
        self.lifecycle.session_opened().await
    }

    pub async fn session_closed(&self) -> Result<usize, Error> {
        self.lifecycle.session_closed().await
    }

    /// Build a request, resolving relative URLs against the application origin.
    pub fn request(&self, method: &str, url: &str, mode: RequestMode) -> Result<InterceptedRequest, Error> {
        let url = canonicalize(url, &self.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(InterceptedRequest::new(method, url, mode))
    }

    /// Intercept hook: supply a response or defer to the network.
    pub async fn intercept(&self, request: &InterceptedRequest) -> Result<Intercept, Error> {
        self.router.handle(request, &self.lifecycle).await
    }

    /// Intercept, performing the default network handling for deferred requests.
    pub async fn fetch(&self, request: &InterceptedRequest) -> Result<ProxyResponse, Error> {
        match self.intercept(request).await? {
            Intercept::Respond(response) => Ok(response),
            Intercept::Passthrough(_) => {
                let response = self.network.fetch(request).await?;
                Ok(ProxyResponse { source: ResponseSource::Passthrough, snapshot: response.to_snapshot() })
            }
        }
    }

    /// Wait for background cache writes to finish.
    pub async fn flush(&self) {
        self.router.flush().await;
    }

    pub async fn status(&self) -> Result<ProxyStatus, Error> {
        Ok(ProxyStatus {
            version: self.version.clone(),
            installing: self.lifecycle.installing().await,
            active: self.lifecycle.active().await,
            waiting: self.lifecycle.waiting().await,
            redundant: self.lifecycle.redundant().await,
            sessions: self.lifecycle.sessions().await,
            stores: self.db.store_summaries().await?,
        })
    }
}
