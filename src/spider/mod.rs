//! Spider module: the crawl engine and its seams
//!
//! - [`Spider`] - per-site start URL, page parsing, pagination and entity construction
//! - [`Transport`] - page fetching, with [`HttpTransport`] as the `reqwest` implementation
//! - [`CrawlEngine`] - the sequential fetch, parse and paginate loop, plus saving

mod engine;
mod traits;
mod transport;

pub use engine::{
    CrawlEngine, CrawlOutcome, CrawlReport, EngineState, PageFailure, ParsedPage, SaveOptions,
    SaveReport, Termination,
};
pub use traits::{CrawlError, CrawlResult, ParseError, RawResponse, Spider, TransportError};
pub use transport::{build_http_client, HttpTransport, Transport, TransportConfig};
