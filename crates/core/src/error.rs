//! Unified error types for offgrid.
//!
//! Every failure is scoped to the operation that produced it; none of these
//! stop the proxy from intercepting later requests.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offline proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., unknown session action).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unsupported URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// A shell manifest fetch failed; the installing generation is discarded.
    #[error("MANIFEST_FETCH_FAILED: {url}: {reason}")]
    ManifestFetchFailed { url: String, reason: String },

    /// Mirroring a response into the active store failed.
    #[error("STORE_WRITE_FAILED: {0}")]
    StoreWriteFailed(String),

    /// Deleting a stale store failed during garbage collection.
    #[error("STORE_DELETE_FAILED: {store}: {reason}")]
    StoreDeleteFailed { store: String, reason: String },

    /// The network could not produce a response.
    #[error("NETWORK_FAILED: {0}")]
    NetworkFailed(String),

    /// Network failed and neither the request key nor the shell fallback is stored.
    #[error("NO_FALLBACK: {0}")]
    NoFallbackAvailable(String),

    /// A lifecycle trigger arrived in a state that cannot honor it.
    #[error("LIFECYCLE_ERROR: {0}")]
    Lifecycle(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored headers could not be encoded or decoded.
    #[error("CACHE_ERROR: encoding failed: {0}")]
    Encoding(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::ManifestFetchFailed { .. } => -32020,
            Error::StoreWriteFailed(_) => -32021,
            Error::StoreDeleteFailed { .. } => -32022,
            Error::NetworkFailed(_) => -32023,
            Error::NoFallbackAvailable(_) => -32024,
            Error::Lifecycle(_) => -32025,
            Error::Database(_) | Error::MigrationFailed(_) | Error::Encoding(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
