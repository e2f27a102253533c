//! Spider traits and types
//!
//! A [`Spider`] knows one site: where to start, how to read a page into raw
//! rows, how to find the next page and how to turn a row into an entity. The
//! engine owns everything else.

use crate::entity::{Entity, EntityResult, Fields, Record};
use crate::recorder::RecorderError;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while fetching a page
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Transport is closed")]
    Closed,
}

/// Errors raised while reading a fetched page
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON in {url}: {source}")]
    Json {
        url: String,
        source: serde_json::Error,
    },

    #[error("Missing field '{field}' in {url}")]
    MissingField { url: String, field: String },

    #[error("Malformed page {url}: {message}")]
    Malformed { url: String, message: String },
}

/// Errors raised by the crawl engine itself
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Engine is closed")]
    EngineClosed,

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),
}

/// Result type for engine operations
pub type CrawlResult<T> = Result<T, CrawlError>;

/// A fetched page as the spider sees it
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Final URL of the request
    pub url: String,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header, if any
    pub content_type: Option<String>,

    /// Decoded body
    pub body: String,
}

impl RawResponse {
    /// Creates a response with no content type
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            body: body.into(),
        }
    }

    /// Deserializes the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_json::from_str(&self.body).map_err(|source| ParseError::Json {
            url: self.url.clone(),
            source,
        })
    }
}

/// Site-specific crawl strategy
///
/// # Example
///
/// ```no_run
/// use nomad_harvest::spider::{CrawlEngine, HttpTransport};
/// use nomad_harvest::spiders::EasyNomadSpider;
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let spider = EasyNomadSpider::new();
/// let transport = HttpTransport::with_defaults(&spider)?;
/// let mut engine = CrawlEngine::new(spider, transport, Duration::from_secs(1));
/// let report = engine.crawl(Some(3)).await?;
/// println!("{} jobs", report.entities.len());
/// # Ok(())
/// # }
/// ```
pub trait Spider: Send + Sync {
    /// Entity type this spider produces
    type Entity: Entity + Clone + Into<Record> + Send;

    /// Short name used in logs
    fn name(&self) -> &str;

    /// First URL of the crawl
    fn start_url(&self) -> String;

    /// Headers the site expects; configured headers override these
    fn default_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Extracts raw rows from a page
    fn parse_page(&self, response: &RawResponse) -> Result<Vec<Fields>, ParseError>;

    /// Returns the next URL to fetch, or None when the listing is exhausted
    fn next_page(&self, response: &RawResponse) -> Option<String>;

    /// Builds an entity from one raw row
    fn create_entity(&self, fields: Fields) -> EntityResult<Self::Entity>;
}
