//! Entry CRUD operations.
//!
//! Entries map a request key to a response snapshot inside one named store.
//! Writes are upserts, so repeating one is harmless.

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Identity of a cached request: method plus canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self { method: method.to_ascii_uppercase(), url: url.into() }
    }

    /// Key for a GET request, the only kind the proxy stores.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn hash(&self) -> String {
        compute_request_key(&self.method, &self.url)
    }
}

/// A stored response: status, headers and body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

const UPSERT_ENTRY: &str = "INSERT INTO entries (store, key_hash, method, url, status, headers_json, body, stored_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT(store, key_hash) DO UPDATE SET
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        stored_at = excluded.stored_at";

// SQLite only parses ON CONFLICT after INSERT ... SELECT when the SELECT has a WHERE.
const UPSERT_EXISTING_ENTRY: &str = "INSERT INTO entries (store, key_hash, method, url, status, headers_json, body, stored_at)
     SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
     WHERE EXISTS (SELECT 1 FROM stores WHERE name = ?1)
     ON CONFLICT(store, key_hash) DO UPDATE SET
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        stored_at = excluded.stored_at";

/// Run one of the entry upserts, returning the number of rows written.
fn upsert_entry(
    conn: &rusqlite::Connection, sql: &str, store: &str, key: &RequestKey, snapshot: &ResponseSnapshot, now: &str,
) -> Result<usize, Error> {
    let headers_json = serde_json::to_string(&snapshot.headers)?;
    let written = conn.execute(
        sql,
        params![store, key.hash(), &key.method, &key.url, snapshot.status, headers_json, &snapshot.body, now],
    )?;
    Ok(written)
}

fn upsert(
    conn: &rusqlite::Connection, store: &str, key: &RequestKey, snapshot: &ResponseSnapshot, now: &str,
) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
        params![store, now],
    )?;
    upsert_entry(conn, UPSERT_ENTRY, store, key, snapshot, now)?;
    Ok(())
}

impl CacheDb {
    /// Insert or replace one entry, creating the store if needed.
    pub async fn put_entry(&self, store: &str, key: &RequestKey, snapshot: &ResponseSnapshot) -> Result<(), Error> {
        let store = store.to_string();
        let key = key.clone();
        let snapshot = snapshot.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> { upsert(conn, &store, &key, &snapshot, &now) })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace one entry only if the store still exists.
    ///
    /// Returns `false`, writing nothing, when the store has been deleted.
    /// The existence check and the write are a single statement, so a
    /// concurrent [`CacheDb::delete_store`] can never be undone by this call.
    pub async fn put_existing_entry(
        &self, store: &str, key: &RequestKey, snapshot: &ResponseSnapshot,
    ) -> Result<bool, Error> {
        let store = store.to_string();
        let key = key.clone();
        let snapshot = snapshot.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let written = upsert_entry(conn, UPSERT_EXISTING_ENTRY, &store, &key, &snapshot, &now)?;
                Ok(written > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a batch of entries in a single transaction.
    ///
    /// Either every entry (and the store itself) is committed or nothing is.
    pub async fn put_entries(&self, store: &str, entries: Vec<(RequestKey, ResponseSnapshot)>) -> Result<(), Error> {
        let store = store.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for (key, snapshot) in &entries {
                    upsert(&tx, &store, key, snapshot, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the snapshot stored for a key.
    ///
    /// Returns None if the store or the key doesn't exist.
    pub async fn get_entry(&self, store: &str, key: &RequestKey) -> Result<Option<ResponseSnapshot>, Error> {
        let store = store.to_string();
        let hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<ResponseSnapshot>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body FROM entries WHERE store = ?1 AND key_hash = ?2",
                    params![store, hash],
                    |row| Ok((row.get::<_, u16>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?)),
                );

                match result {
                    Ok((status, headers_json, body)) => {
                        let headers = serde_json::from_str(&headers_json)?;
                        Ok(Some(ResponseSnapshot { status, headers, body }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All keys held by a store, ordered by URL.
    pub async fn entry_keys(&self, store: &str) -> Result<Vec<RequestKey>, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE store = ?1 ORDER BY url ASC")?;
                let keys = stmt
                    .query_map(params![store], |row| Ok(RequestKey { method: row.get(0)?, url: row.get(1)? }))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a store (zero if it doesn't exist).
    pub async fn count_entries(&self, store: &str) -> Result<u64, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE store = ?1", params![store], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
