use crate::recorder::OutputFormat;
use crate::spider::SaveOptions;
use crate::ConfigError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for nomad-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spider: SpiderConfig,
    pub output: OutputConfig,
}

/// Spider and request configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SpiderConfig {
    /// Spider to run (e.g., "easynomad")
    #[serde(default = "default_spider_name")]
    pub name: String,

    /// Overrides the spider's first URL
    #[serde(rename = "start-url", default)]
    pub start_url: Option<String>,

    /// Pause between consecutive requests (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of pages per run; absent means no cap
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<usize>,

    /// User agent; the spider's own header is used when absent
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Cookies sent with every request
    #[serde(default)]
    pub cookies: IndexMap<String, String>,
}

impl SpiderConfig {
    /// Delay between requests
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            name: default_spider_name(),
            start_url: None,
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_pages: None,
            user_agent: None,
            headers: IndexMap::new(),
            cookies: IndexMap::new(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Output file, or path prefix when several formats are saved
    #[serde(rename = "output-file")]
    pub output_file: String,

    /// Format names ("csv", "json", "markdown", "sqlite", "excel")
    #[serde(rename = "save-formats", default)]
    pub save_formats: Vec<String>,

    /// Skip records already saved
    #[serde(default = "default_incremental")]
    pub incremental: bool,

    /// Primary key column; an empty string disables key reconciliation
    #[serde(rename = "primary-key", default = "default_primary_key")]
    pub primary_key: String,

    /// SQLite table and spreadsheet sheet name
    #[serde(rename = "db-table", default = "default_db_table")]
    pub db_table: String,

    /// Columns left out of every output
    #[serde(rename = "remove-columns", default)]
    pub remove_columns: Vec<String>,
}

impl OutputConfig {
    /// Parses the configured format names
    pub fn formats(&self) -> Result<Vec<OutputFormat>, ConfigError> {
        self.save_formats
            .iter()
            .map(|name| {
                OutputFormat::from_name(name)
                    .map_err(|e| ConfigError::Validation(e.to_string()))
            })
            .collect()
    }

    /// Save options for the crawl engine
    pub fn save_options(&self) -> Result<SaveOptions, ConfigError> {
        let primary_key = Some(self.primary_key.trim().to_string()).filter(|k| !k.is_empty());

        Ok(SaveOptions::new(&self.output_file)
            .with_formats(self.formats()?)
            .with_incremental(self.incremental)
            .with_primary_key(primary_key)
            .with_db_table(self.db_table.clone())
            .with_remove_columns(self.remove_columns.clone()))
    }
}

fn default_spider_name() -> String {
    "easynomad".to_string()
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}


fn default_incremental() -> bool {
    true
}

fn default_primary_key() -> String {
    crate::entity::ID_FIELD.to_string()
}

fn default_db_table() -> String {
    "data".to_string()
}
