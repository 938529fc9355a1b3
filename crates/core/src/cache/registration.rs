//! Persisted registration state.
//!
//! Records which generation was last activated so a restarted process keeps
//! serving it until a newer generation takes over.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

impl CacheDb {
    /// Version of the generation that was last activated, if any.
    pub async fn load_active_version(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT active_version FROM registration WHERE id = 1", [], |row| row.get(0));

                match result {
                    Ok(version) => Ok(Some(version)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record `version` as the active generation.
    pub async fn save_active_version(&self, version: &str) -> Result<(), Error> {
        let version = version.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO registration (id, active_version, activated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET
                        active_version = excluded.active_version,
                        activated_at = excluded.activated_at",
                    params![version, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
