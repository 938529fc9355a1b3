//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - a shell manifest path or bypass pattern is malformed
    ///
    /// Returns `ConfigError::Missing` if the shell manifest is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.shell_manifest.is_empty() {
            return Err(ConfigError::Missing {
                field: "shell_manifest".into(),
                hint: "list at least the entry document, e.g. [\"/\", \"/index.html\"]".into(),
            });
        }
        if let Some(path) = self.shell_manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "shell_manifest".into(),
                reason: format!("path must start with '/': {path}"),
            });
        }

        if !self.shell_manifest.contains(&self.entry_document) {
            return Err(ConfigError::Invalid {
                field: "entry_document".into(),
                reason: format!("{} is not part of shell_manifest", self.entry_document),
            });
        }

        if self.bypass_hosts.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid { field: "bypass_hosts".into(), reason: "empty host pattern".into() });
        }

        if self.skip_waiting {
            tracing::debug!("skip_waiting enabled; new generations take over immediately after install");
        }

        Ok(())
    }
}
