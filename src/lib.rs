//! nomad-harvest: incremental job-board crawling with multi-format persistence
//!
//! A site [`spider::Spider`] turns listing pages into self-identifying
//! [`entity::Entity`] records; the [`spider::CrawlEngine`] pages through the
//! site and hands the records to a [`recorder::DataRecorder`], which drops
//! records it has already saved and writes the rest to CSV, JSON, Markdown,
//! SQLite and xlsx targets.

pub mod config;
pub mod entity;
pub mod recorder;
pub mod spider;
pub mod spiders;

use thiserror::Error;

/// Main error type for nomad-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Entity error: {0}")]
    Entity(#[from] entity::EntityError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] recorder::RecorderError),

    #[error("Crawl error: {0}")]
    Crawl(#[from] spider::CrawlError),

    #[error("Transport error: {0}")]
    Transport(#[from] spider::TransportError),

    #[error("Parse error: {0}")]
    Parse(#[from] spider::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for nomad-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use entity::{Entity, FieldValue, Fields, JobEntity, Record};
pub use recorder::{DataRecorder, OutputFormat, RecorderConfig};
pub use spider::{CrawlEngine, SaveOptions, Spider};
pub use spiders::{harvest, EasyNomadSpider};
