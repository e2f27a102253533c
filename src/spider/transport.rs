//! HTTP transport
//!
//! The engine talks to the network only through [`Transport`], so tests and
//! alternative clients can stand in for [`HttpTransport`].

use crate::config::SpiderConfig;
use crate::spider::traits::{RawResponse, Spider, TransportError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Fetches pages for the engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url` and returns the decoded page
    ///
    /// Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<RawResponse, TransportError>;

    /// Releases the underlying client; later fetches fail
    fn close(&self) {}
}

/// Request settings for [`HttpTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// User agent; falls back to a `User-Agent` header, then to the crate name
    pub user_agent: Option<String>,

    /// Whole-request timeout
    pub timeout: Duration,

    /// Extra request headers, applied over the spider's defaults
    pub headers: Vec<(String, String)>,

    /// Cookies sent with every request
    pub cookies: Vec<(String, String)>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout: Duration::from_secs(10),
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }
}

impl From<&SpiderConfig> for TransportConfig {
    fn from(config: &SpiderConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cookies: config
                .cookies
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Builds an HTTP client with default headers, cookies and timeout
///
/// # Arguments
///
/// * `config` - Request settings
/// * `site_headers` - Headers the site expects, overridden by `config.headers`
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(TransportError::Client)` - Invalid header or client build failure
pub fn build_http_client(
    config: &TransportConfig,
    site_headers: &[(String, String)],
) -> Result<Client, TransportError> {
    let mut headers = HeaderMap::new();

    for (name, value) in site_headers.iter().chain(config.headers.iter()) {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Client(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Client(format!("Invalid value for {}: {}", name, e)))?;
        headers.insert(name, value);
    }

    if !config.cookies.is_empty() {
        let cookie = config
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| TransportError::Client(format!("Invalid cookie value: {}", e)))?;
        headers.insert(COOKIE, value);
    }

    let user_agent = match &config.user_agent {
        Some(agent) => agent.clone(),
        None => match headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
            Some(agent) => agent.to_string(),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        },
    };

    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| TransportError::Client(e.to_string()))
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    client: Client,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Creates a transport from request settings and the spider's site headers
    pub fn new<S: Spider>(config: &TransportConfig, spider: &S) -> Result<Self, TransportError> {
        let client = build_http_client(config, &spider.default_headers())?;
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }

    /// Creates a transport with default settings for `spider`
    pub fn with_defaults<S: Spider>(spider: &S) -> Result<Self, TransportError> {
        Self::new(&TransportConfig::default(), spider)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<RawResponse, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| classify_error(url, e))?;

        Ok(RawResponse {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("HTTP transport closed");
        }
    }
}

fn classify_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
