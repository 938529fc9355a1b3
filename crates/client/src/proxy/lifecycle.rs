//! Generation lifecycle: install, wait, activate, take over.
//!
//! ```text
//! Installing ──ok──▶ Waiting ──sessions closed / TAKE_OVER──▶ Activating ──gc──▶ Active
//!     │                 │
//!     └──fetch failed──▶ Redundant ◀──superseded by a newer install
//!                           ▲
//!                           └──────── active generation replaced on activation
//! ```
//!
//! The most recent generation to become `Redundant` is kept for reporting.
//!
//! The registration lock is held for the whole activation, so nothing can
//! resolve the active store while stale generations are being deleted.

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use url::Url;

use super::control::ControlMessage;
use crate::fetch::{InterceptedRequest, Network, canonicalize};
use offgrid_core::{CacheDb, Error, RequestKey, ResponseSnapshot, VersionedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

/// One versioned lifecycle of the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct Generation {
    pub version: String,
    pub state: LifecycleState,
}

impl Generation {
    fn new(version: impl Into<String>, state: LifecycleState) -> Self {
        Self { version: version.into(), state }
    }
}

/// Resources stored atomically when a generation installs.
#[derive(Debug, Clone)]
pub struct ShellManifest {
    urls: Vec<Url>,
}

impl ShellManifest {
    /// Resolve manifest paths against the application origin.
    pub fn new<S: AsRef<str>>(origin: &Url, paths: &[S]) -> Result<Self, Error> {
        let urls = paths
            .iter()
            .map(|p| canonicalize(p.as_ref(), origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", p.as_ref()))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn keys(&self) -> Vec<RequestKey> {
        self.urls.iter().map(|u| RequestKey::get(u.as_str())).collect()
    }
}

#[derive(Debug, Default)]
struct Registration {
    installing: Option<Generation>,
    active: Option<Generation>,
    waiting: Option<Generation>,
    /// Most recent generation that failed, was superseded or was replaced.
    redundant: Option<Generation>,
    sessions: usize,
}

impl Registration {
    fn retire(&mut self, mut generation: Generation) {
        tracing::info!(version = %generation.version, from = ?generation.state, "generation is redundant");
        generation.state = LifecycleState::Redundant;
        self.redundant = Some(generation);
    }

    fn finish_install(&mut self, version: &str) {
        if self.installing.as_ref().is_some_and(|g| g.version == version) {
            self.installing = None;
        }
    }
}

/// Drives generations through their lifecycle.
pub struct LifecycleController {
    db: CacheDb,
    network: Arc<dyn Network>,
    manifest: ShellManifest,
    skip_waiting: bool,
    registration: RwLock<Registration>,
}

impl LifecycleController {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, manifest: ShellManifest, skip_waiting: bool) -> Self {
        Self { db, network, manifest, skip_waiting, registration: RwLock::new(Registration::default()) }
    }

    /// Reload the generation that was active before the process started.
    pub async fn restore(&self) -> Result<Option<Generation>, Error> {
        let persisted = self.db.load_active_version().await?;
        let mut reg = self.registration.write().await;
        if reg.active.is_none()
            && let Some(version) = persisted
        {
            tracing::info!(version = %version, "restored active generation");
            reg.active = Some(Generation::new(version, LifecycleState::Active));
        }
        Ok(reg.active.clone())
    }

    /// Install `version`: fetch the shell manifest and commit it as one batch.
    ///
    /// On success the generation waits for open sessions of the previous
    /// generation to close, unless nothing blocks it or `skip_waiting` is set,
    /// in which case it activates right away.
    ///
    /// # Errors
    ///
    /// `ManifestFetchFailed` if any manifest resource could not be fetched; the
    /// store is left untouched and the previous generation keeps serving.
    pub async fn install(&self, version: &str) -> Result<Generation, Error> {
        tracing::info!(version, resources = self.manifest.urls().len(), "install started");
        self.registration.write().await.installing = Some(Generation::new(version, LifecycleState::Installing));

        let committed = match self.fetch_manifest().await {
            Ok(entries) => self.db.put_entries(version, entries).await,
            Err(e) => Err(e),
        };

        let mut reg = self.registration.write().await;
        reg.finish_install(version);

        if let Err(e) = committed {
            tracing::error!(version, error = %e, "install failed");
            if reg.active.as_ref().is_none_or(|g| g.version != version) {
                reg.retire(Generation::new(version, LifecycleState::Installing));
            }
            return Err(e);
        }

        tracing::info!(version, "install succeeded");

        if let Some(active) = reg.active.clone()
            && active.version == version
        {
            tracing::debug!(version, "reinstalled the active generation");
            // Sweep anything a failed earlier pass left behind.
            if let Err(e) = self.db.garbage_collect(version).await {
                tracing::warn!(version, error = %e, "garbage collection after reinstall failed");
            }
            return Ok(active);
        }

        if let Some(previous) = reg.waiting.take()
            && previous.version != version
        {
            tracing::debug!(version = %previous.version, superseded_by = version, "waiting generation superseded");
            reg.retire(previous);
        }

        let generation = Generation::new(version, LifecycleState::Waiting);
        reg.waiting = Some(generation.clone());

        if self.skip_waiting || reg.active.is_none() || reg.sessions == 0 {
            return self.activate_locked(&mut reg).await;
        }

        tracing::info!(version, sessions = reg.sessions, "waiting for open sessions to close");
        Ok(generation)
    }

    /// External activate trigger.
    ///
    /// Returns the active generation unchanged when nothing is waiting.
    pub async fn activate(&self) -> Result<Generation, Error> {
        let mut reg = self.registration.write().await;
        if reg.waiting.is_none()
            && let Some(active) = reg.active.as_ref()
        {
            return Ok(active.clone());
        }
        self.activate_locked(&mut reg).await
    }

    /// Handle a control message. Only `TAKE_OVER` has an effect.
    pub async fn on_control_message(&self, message: &ControlMessage) -> Result<Option<Generation>, Error> {
        if !message.is_take_over() {
            tracing::debug!(kind = %message.kind, "ignoring unrecognized control message");
            return Ok(None);
        }

        let mut reg = self.registration.write().await;
        if reg.waiting.is_none() {
            tracing::debug!("take-over requested with no waiting generation");
            return Ok(reg.active.clone());
        }

        tracing::info!("take-over requested");
        self.activate_locked(&mut reg).await.map(Some)
    }

    /// Record a newly opened session. Returns the open session count.
    pub async fn session_opened(&self) -> usize {
        let mut reg = self.registration.write().await;
        reg.sessions += 1;
        reg.sessions
    }

    /// Record a closed session, activating a waiting generation once none remain.
    pub async fn session_closed(&self) -> Result<usize, Error> {
        let mut reg = self.registration.write().await;
        reg.sessions = reg.sessions.saturating_sub(1);
        if reg.sessions == 0 && reg.waiting.is_some() {
            tracing::info!("last session closed");
            self.activate_locked(&mut reg).await?;
        }
        Ok(reg.sessions)
    }

    pub async fn active(&self) -> Option<Generation> {
        self.registration.read().await.active.clone()
    }

    pub async fn waiting(&self) -> Option<Generation> {
        self.registration.read().await.waiting.clone()
    }

    /// Generation whose manifest fetch is in progress.
    pub async fn installing(&self) -> Option<Generation> {
        self.registration.read().await.installing.clone()
    }

    /// Most recently retired generation, in state `Redundant`.
    pub async fn redundant(&self) -> Option<Generation> {
        self.registration.read().await.redundant.clone()
    }

    pub async fn sessions(&self) -> usize {
        self.registration.read().await.sessions
    }

    /// Store of the active generation. Waits while an activation is running.
    pub async fn active_store(&self) -> Option<VersionedStore> {
        let reg = self.registration.read().await;
        reg.active
            .as_ref()
            .map(|g| VersionedStore::new(self.db.clone(), g.version.clone()))
    }

    async fn fetch_manifest(&self) -> Result<Vec<(RequestKey, ResponseSnapshot)>, Error> {
        let fetches = self.manifest.urls().iter().map(|url| async move {
            let request = InterceptedRequest::get(url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::ManifestFetchFailed { url: url.to_string(), reason: e.to_string() })?;

            if !response.status.is_success() {
                return Err(Error::ManifestFetchFailed {
                    url: url.to_string(),
                    reason: format!("status {}", response.status.as_u16()),
                });
            }

            Ok((request.key(), response.to_snapshot()))
        });

        try_join_all(fetches).await
    }

    async fn activate_locked(&self, reg: &mut Registration) -> Result<Generation, Error> {
        let Some(mut generation) = reg.waiting.take() else {
            return Err(Error::Lifecycle("no generation is waiting to activate".into()));
        };

        generation.state = LifecycleState::Activating;
        tracing::info!(version = %generation.version, "activate started");

        let report = match self.db.garbage_collect(&generation.version).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(version = %generation.version, error = %e, "activate failed; generation keeps waiting");
                generation.state = LifecycleState::Waiting;
                reg.waiting = Some(generation);
                return Err(e);
            }
        };

        if let Err(e) = self.db.save_active_version(&generation.version).await {
            tracing::warn!(version = %generation.version, error = %e, "failed to persist active generation");
        }

        generation.state = LifecycleState::Active;
        if let Some(previous) = reg.active.replace(generation.clone())
            && previous.version != generation.version
        {
            reg.retire(previous);
        }

        tracing::info!(
            version = %generation.version,
            removed = report.removed.len(),
            sessions = reg.sessions,
            "activate succeeded; claimed open sessions"
        );

        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::testing::{SHELL, StubNetwork, controller, origin, url};

    #[test]
    fn test_manifest_resolves_paths() {
        let manifest = ShellManifest::new(&origin(), SHELL).unwrap();
        let urls: Vec<&str> = manifest.urls().iter().map(|u| u.as_str()).collect();
        assert_eq!(urls, vec!["https://app.test/", "https://app.test/index.html", "https://app.test/manifest.json"]);
    }

    #[tokio::test]
    async fn test_install_stores_exactly_the_manifest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);

        let generation = lifecycle.install("v1").await.unwrap();

        assert_eq!(generation, Generation::new("v1", LifecycleState::Active));
        let mut keys = db.entry_keys("v1").await.unwrap();
        keys.sort_by(|a, b| a.url.cmp(&b.url));
        let mut expected = ShellManifest::new(&origin(), SHELL).unwrap().keys();
        expected.sort_by(|a, b| a.url.cmp(&b.url));
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        network.fail(&url("/manifest.json"));
        let lifecycle = controller(&db, &network, false);

        let result = lifecycle.install("v1").await;

        assert!(matches!(result, Err(Error::ManifestFetchFailed { ref url, .. }) if url.ends_with("/manifest.json")));
        assert_eq!(db.count_entries("v1").await.unwrap(), 0);
        assert!(!db.has_store("v1").await.unwrap());
        assert!(lifecycle.active().await.is_none());
        assert!(lifecycle.waiting().await.is_none());
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        network.respond(&url("/index.html"), 404, "missing");
        let lifecycle = controller(&db, &network, false);

        let result = lifecycle.install("v1").await;

        assert!(matches!(result, Err(Error::ManifestFetchFailed { ref reason, .. }) if reason == "status 404"));
        assert_eq!(db.count_entries("v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);
        lifecycle.install("v1").await.unwrap();

        network.fail(&url("/"));
        assert!(lifecycle.install("v2").await.is_err());

        assert_eq!(lifecycle.active().await.unwrap().version, "v1");
        assert_eq!(lifecycle.redundant().await, Some(Generation::new("v2", LifecycleState::Redundant)));
        assert!(lifecycle.installing().await.is_none());
        assert_eq!(db.store_names().await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn test_repeated_install_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);

        let first = lifecycle.install("v1").await.unwrap();
        let keys_once = db.entry_keys("v1").await.unwrap();
        let root_once = db.get_entry("v1", &RequestKey::get("https://app.test/")).await.unwrap();

        let second = lifecycle.install("v1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(db.entry_keys("v1").await.unwrap(), keys_once);
        assert_eq!(db.get_entry("v1", &RequestKey::get("https://app.test/")).await.unwrap(), root_once);
        assert_eq!(db.store_names().await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn test_activation_deletes_stale_stores() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);
        lifecycle.install("v1").await.unwrap();

        network.serve_shell("v2");
        let generation = lifecycle.install("v2").await.unwrap();

        assert_eq!(generation.state, LifecycleState::Active);
        assert_eq!(db.store_names().await.unwrap(), vec!["v2".to_string()]);
        assert_eq!(db.load_active_version().await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_waits_while_sessions_are_open() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);
        lifecycle.install("v1").await.unwrap();
        lifecycle.session_opened().await;
        lifecycle.session_opened().await;

        network.serve_shell("v2");
        let generation = lifecycle.install("v2").await.unwrap();

        assert_eq!(generation.state, LifecycleState::Waiting);
        assert_eq!(lifecycle.active().await.unwrap().version, "v1");
        assert!(db.has_store("v1").await.unwrap());
        assert!(db.has_store("v2").await.unwrap());

        assert_eq!(lifecycle.session_closed().await.unwrap(), 1);
        assert_eq!(lifecycle.active().await.unwrap().version, "v1");

        assert_eq!(lifecycle.session_closed().await.unwrap(), 0);
        assert_eq!(lifecycle.active().await.unwrap().version, "v2");
        assert!(lifecycle.waiting().await.is_none());
        assert_eq!(db.store_names().await.unwrap(), vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_take_over_skips_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);
        lifecycle.install("v1").await.unwrap();
        lifecycle.session_opened().await;

        network.serve_shell("v2");
        lifecycle.install("v2").await.unwrap();

        let ignored = lifecycle.on_control_message(&ControlMessage::new("REFRESH")).await.unwrap();
        assert!(ignored.is_none());
        assert_eq!(lifecycle.waiting().await.unwrap().version, "v2");

        let activated = lifecycle.on_control_message(&ControlMessage::take_over()).await.unwrap();
        assert_eq!(activated, Some(Generation::new("v2", LifecycleState::Active)));
        assert_eq!(lifecycle.sessions().await, 1);

        let again = lifecycle.on_control_message(&ControlMessage::take_over()).await.unwrap();
        assert_eq!(again, Some(Generation::new("v2", LifecycleState::Active)));
        assert_eq!(db.store_names().await.unwrap(), vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_immediately() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, true);
        lifecycle.install("v1").await.unwrap();
        lifecycle.session_opened().await;

        network.serve_shell("v2");
        let generation = lifecycle.install("v2").await.unwrap();

        assert_eq!(generation.state, LifecycleState::Active);
        assert_eq!(lifecycle.active().await.unwrap().version, "v2");
    }

    #[tokio::test]
    async fn test_newer_install_supersedes_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);
        lifecycle.install("v1").await.unwrap();
        lifecycle.session_opened().await;

        lifecycle.install("v2").await.unwrap();
        lifecycle.install("v3").await.unwrap();
        assert_eq!(lifecycle.waiting().await, Some(Generation::new("v3", LifecycleState::Waiting)));
        assert_eq!(lifecycle.redundant().await, Some(Generation::new("v2", LifecycleState::Redundant)));

        lifecycle.activate().await.unwrap();
        assert_eq!(lifecycle.active().await.unwrap().version, "v3");
        assert_eq!(lifecycle.redundant().await, Some(Generation::new("v1", LifecycleState::Redundant)));
        assert_eq!(db.store_names().await.unwrap(), vec!["v3".to_string()]);
    }

    #[tokio::test]
    async fn test_installing_is_reported_during_manifest_fetch() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let gate = network.hold(&url("/manifest.json"));
        let lifecycle = controller(&db, &network, false);

        let (installed, ()) = tokio::join!(lifecycle.install("v1"), async {
            gate.reached().await;
            assert_eq!(lifecycle.installing().await, Some(Generation::new("v1", LifecycleState::Installing)));
            assert!(lifecycle.active().await.is_none());
            gate.open();
        });

        assert_eq!(installed.unwrap().state, LifecycleState::Active);
        assert!(lifecycle.installing().await.is_none());
        assert!(lifecycle.redundant().await.is_none());
    }

    #[tokio::test]
    async fn test_reinstalling_active_sweeps_stale_stores() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.save_active_version("v1").await.unwrap();
        db.open_store("v0").await.unwrap();
        let network = StubNetwork::new();
        network.serve_shell("v1");
        let lifecycle = controller(&db, &network, false);
        lifecycle.restore().await.unwrap();

        let generation = lifecycle.install("v1").await.unwrap();

        assert_eq!(generation, Generation::new("v1", LifecycleState::Active));
        assert_eq!(db.store_names().await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_without_install_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        let lifecycle = controller(&db, &network, false);

        assert!(matches!(lifecycle.activate().await, Err(Error::Lifecycle(_))));
        assert!(lifecycle.on_control_message(&ControlMessage::take_over()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_resumes_persisted_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.save_active_version("v1").await.unwrap();
        let network = StubNetwork::new();
        let lifecycle = controller(&db, &network, false);

        let restored = lifecycle.restore().await.unwrap();

        assert_eq!(restored, Some(Generation::new("v1", LifecycleState::Active)));
        assert_eq!(lifecycle.active_store().await.unwrap().version(), "v1");
    }
}
