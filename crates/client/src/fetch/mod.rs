//! Network access for the offline proxy.
//!
//! ### Network seam
//! - The [`Network`] trait is the only way the router and lifecycle reach the
//!   network, so tests can substitute deterministic outcomes.
//!
//! ### Failure model
//! - Transport errors, timeouts and oversized bodies are `NetworkFailed`.
//! - Any HTTP status, including 4xx/5xx, is a response, not a failure.
//!
//! ### Response classification
//! - `Basic`: final URL is same-origin with the application.
//! - `Cors`: cross-origin request answered by its own origin.
//! - `Opaque`: a redirect moved the response to a different origin than the
//!   one requested.

pub mod request;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, header};
use std::time::{Duration, Instant};

pub use request::{InterceptedRequest, RequestMode};
pub use self::url::{UrlError, canonicalize, is_streaming, same_origin};

use ::url::Url;
use offgrid_core::{AppConfig, Error, ResponseSnapshot};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offgrid/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Application origin used to classify responses.
    pub origin: Url,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "offgrid/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            origin: Url::parse("http://localhost:5173").expect("static origin parses"),
        }
    }
}

impl FetchConfig {
    /// Fetch settings from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            origin,
            ..Default::default()
        })
    }
}

/// How a response relates to the application origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Basic,
    Cors,
    Opaque,
}

impl ResponseKind {
    /// Classify a response by the URL that was requested and the URL that answered.
    pub fn classify(requested: &Url, answered: &Url, origin: &Url) -> Self {
        if !same_origin(requested, answered) {
            ResponseKind::Opaque
        } else if same_origin(answered, origin) {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

/// Response from the network.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    /// The final URL after redirects
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Response body bytes
    pub body: Bytes,
    /// Origin classification
    pub kind: ResponseKind,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl NetworkResponse {
    /// Copy of this response suitable for storage.
    ///
    /// Every header is kept. Values that are not valid UTF-8 are decoded
    /// lossily, so opaque bytes become U+FFFD.
    pub fn to_snapshot(&self) -> ResponseSnapshot {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        ResponseSnapshot::new(self.status.as_u16(), headers, self.body.to_vec())
    }
}

/// Anything that can perform a request on the proxy's behalf.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request, returning `Error::NetworkFailed` when no response arrives.
    async fn fetch(&self, request: &InterceptedRequest) -> Result<NetworkResponse, Error>;
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<NetworkResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", request.method, e)))?;

        let response = self
            .http
            .request(method, request.url.as_str())
            .send()
            .await
            .map_err(|e| Error::NetworkFailed(format!("{}: {}", request.url, e)))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::NetworkFailed(format!(
                "{}: {} bytes exceeds {}",
                request.url, len, self.config.max_bytes
            )));
        }

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::NetworkFailed(format!("{}: failed to read response: {}", request.url, e)))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::NetworkFailed(format!(
                "{}: {} bytes exceeds {}",
                request.url,
                body.len(),
                self.config.max_bytes
            )));
        }

        let kind = ResponseKind::classify(&request.url, &final_url, &self.config.origin);
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} {} in {}ms ({} bytes)",
            request.method,
            request.url,
            final_url,
            status.as_u16(),
            fetch_ms,
            body.len()
        );

        Ok(NetworkResponse { url: final_url, status, headers, body, kind, fetch_ms })
    }
}
