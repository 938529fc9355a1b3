//! Bypass policy: which requests the proxy never intercepts.

use regex::Regex;
use serde::Serialize;

use crate::fetch::{InterceptedRequest, is_streaming};
use offgrid_core::Error;

/// Why a request was handed straight to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BypassReason {
    /// Only GET requests are cached.
    Method,
    /// Host matches an always-network pattern.
    Origin,
    /// Persistent streaming connection.
    Scheme,
    /// No generation is active yet.
    Inactive,
}

/// Routing decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Bypass(BypassReason),
    NetworkFirst,
}

/// A compiled host pattern.
///
/// `example.com` matches `example.com` and any subdomain of it; `*` matches
/// any run of host characters, so `*.example.com` matches subdomains only.
#[derive(Debug, Clone)]
pub struct HostPattern {
    source: String,
    regex: Regex,
}

impl HostPattern {
    pub fn new(pattern: &str) -> Result<Self, Error> {
        let source = pattern.trim().to_lowercase();
        if source.is_empty() {
            return Err(Error::InvalidInput("empty host pattern".into()));
        }

        let body = if source.contains('*') {
            source
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("[a-z0-9.-]*")
        } else {
            format!("(?:[a-z0-9-]+\\.)*{}", regex::escape(&source))
        };

        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| Error::InvalidInput(format!("host pattern {pattern}: {e}")))?;

        Ok(Self { source, regex })
    }

    pub fn matches(&self, host: &str) -> bool {
        self.regex.is_match(&host.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Ordered bypass checks: method, then origin, then scheme.
#[derive(Debug, Clone, Default)]
pub struct BypassPolicy {
    hosts: Vec<HostPattern>,
}

impl BypassPolicy {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, Error> {
        let hosts = patterns
            .iter()
            .map(|p| HostPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { hosts })
    }

    pub fn classify(&self, request: &InterceptedRequest) -> Route {
        if !request.is_get() {
            return Route::Bypass(BypassReason::Method);
        }

        if let Some(host) = request.url.host_str()
            && self.hosts.iter().any(|p| p.matches(host))
        {
            return Route::Bypass(BypassReason::Origin);
        }

        if is_streaming(&request.url) {
            return Route::Bypass(BypassReason::Scheme);
        }

        Route::NetworkFirst
    }
}
