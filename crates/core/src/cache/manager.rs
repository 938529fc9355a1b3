//! Cache store manager.
//!
//! [`VersionedStore`] binds reads and writes to the store named by one
//! generation. [`CacheDb::garbage_collect`] removes every other store.

use super::connection::CacheDb;
use super::entries::{RequestKey, ResponseSnapshot};
use crate::Error;
use serde::{Deserialize, Serialize};

/// Outcome of a garbage-collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GcReport {
    /// Store that was kept.
    pub kept: String,
    /// Stores deleted by this pass.
    pub removed: Vec<String>,
    /// Stores that could not be deleted, with the reason.
    pub failed: Vec<(String, String)>,
}

impl CacheDb {
    /// Delete every store whose name is not exactly `current`.
    ///
    /// Deletion is best effort: a store that fails to delete is recorded in
    /// [`GcReport::failed`] and the remaining stores are still processed.
    ///
    /// # Errors
    ///
    /// Fails only if the store list itself cannot be read.
    pub async fn garbage_collect(&self, current: &str) -> Result<GcReport, Error> {
        let names = self.store_names().await?;
        let mut report = GcReport { kept: current.to_string(), ..Default::default() };

        for name in names.into_iter().filter(|n| n != current) {
            match self.delete_store(&name).await {
                Ok(_) => report.removed.push(name),
                Err(e) => {
                    tracing::warn!(store = %name, error = %e, "failed to delete stale store");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        tracing::info!(kept = %report.kept, removed = ?report.removed, failed = report.failed.len(), "garbage collection finished");

        Ok(report)
    }
}

/// Read/write access to the store of a single generation.
#[derive(Clone, Debug)]
pub struct VersionedStore {
    db: CacheDb,
    version: String,
}

impl VersionedStore {
    pub fn new(db: CacheDb, version: impl Into<String>) -> Self {
        Self { db, version: version.into() }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Snapshot stored for `key`, if any.
    pub async fn read(&self, key: &RequestKey) -> Result<Option<ResponseSnapshot>, Error> {
        self.db.get_entry(&self.version, key).await
    }

    /// Store `snapshot` under `key`, replacing any previous value.
    ///
    /// Never creates the store: returns `false` once garbage collection has
    /// deleted it.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`Error::StoreWriteFailed`].
    pub async fn write(&self, key: &RequestKey, snapshot: &ResponseSnapshot) -> Result<bool, Error> {
        self.db
            .put_existing_entry(&self.version, key, snapshot)
            .await
            .map_err(|e| Error::StoreWriteFailed(format!("{} {}: {e}", key.method, key.url)))
    }
}
