//! Crawl engine - the fetch, parse and paginate loop
//!
//! The engine drives one [`Spider`] over one [`Transport`], one page at a
//! time, and can hand the collected entities to a [`DataRecorder`].
//!
//! A page that fails to fetch or parse ends the crawl early; everything
//! collected before it is still returned (and saved by
//! [`CrawlEngine::crawl_and_save`]). A row that cannot become an entity is
//! reported and skipped.

use crate::entity::Entity;
use crate::recorder::{
    DataRecorder, OutputFormat, RecordFailure, RecorderConfig, RecorderResult,
};
use crate::spider::traits::{CrawlError, CrawlResult, ParseError, RawResponse, Spider, TransportError};
use crate::spider::transport::{HttpTransport, Transport};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle of the engine within one crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    Fetching,
    Parsing,
    Paginating,
    Done,
    Failed,
}

/// A page that could not be fetched or parsed
#[derive(Debug, Clone, PartialEq)]
pub struct PageFailure {
    /// 1-based page number
    pub page: usize,

    /// URL of the page
    pub url: String,

    /// Error description
    pub reason: String,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} ({}): {}", self.page, self.url, self.reason)
    }
}

/// Why a crawl stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The spider reported no further page
    Exhausted,
    /// The page cap was reached
    PageCap,
    /// A page failed; earlier pages were kept
    PageFailure(PageFailure),
}

impl Termination {
    /// Returns true if the crawl ended on a failed page
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::PageFailure(_))
    }
}

/// Entities of one parsed page plus the rows that were dropped
#[derive(Debug, Clone)]
pub struct ParsedPage<E> {
    pub entities: Vec<E>,
    pub failures: Vec<RecordFailure>,
}

/// Result of a crawl
#[derive(Debug, Clone)]
pub struct CrawlReport<E> {
    /// Entities in page order
    pub entities: Vec<E>,

    /// Pages fetched successfully
    pub pages: usize,

    /// Why the crawl stopped
    pub termination: Termination,

    /// Rows that could not become entities
    pub record_failures: Vec<RecordFailure>,
}

/// Where and how crawled entities are saved
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    /// Output path or path prefix
    pub output_path: PathBuf,

    /// Explicit formats; empty means infer from the path's extension
    pub formats: Vec<OutputFormat>,

    /// Skip entities that are already persisted
    pub incremental: bool,

    /// Column used to reconcile with persisted data
    pub primary_key: Option<String>,

    /// Table name for SQLite, sheet name for spreadsheets
    pub db_table: String,

    /// Columns left out of every target
    pub remove_columns: Vec<String>,
}

impl SaveOptions {
    /// Creates incremental options keyed on `id`
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        let defaults = RecorderConfig::new(output_path);
        Self {
            output_path: defaults.output_path,
            formats: Vec::new(),
            incremental: true,
            primary_key: defaults.primary_key,
            db_table: defaults.db_table,
            remove_columns: Vec::new(),
        }
    }

    pub fn with_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_primary_key(mut self, primary_key: Option<String>) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn with_db_table(mut self, db_table: impl Into<String>) -> Self {
        self.db_table = db_table.into();
        self
    }

    pub fn with_remove_columns(mut self, columns: Vec<String>) -> Self {
        self.remove_columns = columns;
        self
    }

    /// Recorder configuration for these options
    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig::new(self.output_path.clone())
            .with_formats(self.formats.clone())
            .with_primary_key(self.primary_key.clone())
            .with_db_table(self.db_table.clone())
    }

    /// Resolves targets and checks the key requirement without touching disk
    pub fn validate(&self) -> RecorderResult<()> {
        let config = self.recorder_config();
        if self.incremental {
            config.check_incremental()
        } else {
            config.targets().map(|_| ())
        }
    }
}

/// What a save did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// Entities taken into the batch
    pub added: usize,

    /// Entities skipped as already persisted
    pub skipped: usize,

    /// Entities flushed to the targets
    pub written: usize,

    /// Entities dropped for lack of identity
    pub failures: Vec<RecordFailure>,
}

/// Result of [`CrawlEngine::crawl_and_save`]
#[derive(Debug, Clone)]
pub struct CrawlOutcome<E> {
    pub report: CrawlReport<E>,
    pub saved: SaveReport,
}

/// Drives a spider over a transport
pub struct CrawlEngine<S: Spider, T: Transport = HttpTransport> {
    spider: S,
    transport: T,
    delay: Duration,
    state: EngineState,
    requests: usize,
    closed: bool,
}

impl<S: Spider, T: Transport> CrawlEngine<S, T> {
    /// Creates an engine
    ///
    /// # Arguments
    ///
    /// * `spider` - Site strategy
    /// * `transport` - Page fetcher
    /// * `delay` - Pause before every request after the first
    pub fn new(spider: S, transport: T, delay: Duration) -> Self {
        Self {
            spider,
            transport,
            delay,
            state: EngineState::Ready,
            requests: 0,
            closed: false,
        }
    }

    /// Returns the spider
    pub fn spider(&self) -> &S {
        &self.spider
    }

    /// Returns the current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Returns true once [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Starting URL of the crawl
    pub fn get_url(&self) -> String {
        self.spider.start_url()
    }

    /// Fetches one page, waiting out the delay if a request was already made
    pub async fn fetch_page(&mut self, url: &str) -> Result<RawResponse, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        if self.requests > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.requests += 1;
        self.state = EngineState::Fetching;

        self.transport.fetch(url).await
    }

    /// Parses a page into entities
    ///
    /// Rows that fail entity construction or identity resolution are
    /// reported in [`ParsedPage::failures`]; the rest of the page is kept.
    ///
    /// # Arguments
    ///
    /// * `response` - The fetched page
    /// * `page` - 1-based page number, used in failure reports
    pub fn parse_page(
        &mut self,
        response: &RawResponse,
        page: usize,
    ) -> Result<ParsedPage<S::Entity>, ParseError> {
        self.state = EngineState::Parsing;

        let rows = self.spider.parse_page(response)?;
        let mut entities = Vec::with_capacity(rows.len());
        let mut failures = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            let built = self
                .spider
                .create_entity(row)
                .and_then(|mut entity| entity.ensure_id().map(|_| entity));

            match built {
                Ok(entity) => entities.push(entity),
                Err(error) => {
                    tracing::debug!("Skipping row {} on page {}: {}", index, page, error);
                    failures.push(RecordFailure {
                        page: Some(page),
                        index,
                        error,
                    });
                }
            }
        }

        Ok(ParsedPage { entities, failures })
    }

    /// Next URL to fetch, if any
    pub fn get_next_page(&self, response: &RawResponse) -> Option<String> {
        self.spider.next_page(response)
    }

    /// Crawls up to `max_pages` pages, or until the spider runs out of pages
    /// when `max_pages` is `None`
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Entities collected and why the crawl stopped
    /// * `Err(CrawlError::EngineClosed)` - The engine was closed
    pub async fn crawl(
        &mut self,
        max_pages: Option<usize>,
    ) -> CrawlResult<CrawlReport<S::Entity>> {
        if self.closed {
            return Err(CrawlError::EngineClosed);
        }

        self.state = EngineState::Ready;
        let start_time = std::time::Instant::now();
        tracing::info!(
            "Starting {} crawl at {} ({})",
            self.spider.name(),
            self.get_url(),
            page_cap(max_pages)
        );

        let mut next = Some(self.get_url());
        let mut entities = Vec::new();
        let mut record_failures = Vec::new();
        let mut pages = 0;

        let termination = loop {
            let Some(url) = next.take() else {
                break Termination::Exhausted;
            };
            if let Some(cap) = max_pages.filter(|cap| pages >= *cap) {
                tracing::info!("Reached page cap of {}", cap);
                break Termination::PageCap;
            }

            let response = match self.fetch_page(&url).await {
                Ok(response) => response,
                Err(e) => break self.fail(pages + 1, &url, e.to_string()),
            };

            let parsed = match self.parse_page(&response, pages + 1) {
                Ok(parsed) => parsed,
                Err(e) => break self.fail(pages + 1, &url, e.to_string()),
            };
            pages += 1;

            tracing::info!(
                "Page {}: {} entities ({} rows skipped)",
                pages,
                parsed.entities.len(),
                parsed.failures.len()
            );
            entities.extend(parsed.entities);
            record_failures.extend(parsed.failures);

            self.state = EngineState::Paginating;
            next = self.get_next_page(&response);
        };

        if !termination.is_failure() {
            self.state = EngineState::Done;
        }

        tracing::info!(
            "Crawl finished: {} pages, {} entities in {:.2}s",
            pages,
            entities.len(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(CrawlReport {
            entities,
            pages,
            termination,
            record_failures,
        })
    }

    fn fail(&mut self, page: usize, url: &str, reason: String) -> Termination {
        tracing::warn!("Stopping crawl at page {} ({}): {}", page, url, reason);
        self.state = EngineState::Failed;
        Termination::PageFailure(PageFailure {
            page,
            url: url.to_string(),
            reason,
        })
    }

    /// Saves entities through a fresh recorder
    ///
    /// # Arguments
    ///
    /// * `entities` - Entities to save
    /// * `options` - Targets, key and incremental mode
    pub fn save_data(
        &self,
        entities: &[S::Entity],
        options: &SaveOptions,
    ) -> CrawlResult<SaveReport> {
        options.validate()?;
        let mut recorder = DataRecorder::new(options.recorder_config())?;
        let result = persist(&mut recorder, entities, options);
        close_recorder(&mut recorder);
        result
    }

    /// Crawls and saves in one step
    ///
    /// Targets are resolved and opened before the first request, so a bad
    /// output configuration fails without any network activity. Entities
    /// from pages before a failed page are still saved.
    pub async fn crawl_and_save(
        &mut self,
        max_pages: Option<usize>,
        options: &SaveOptions,
    ) -> CrawlResult<CrawlOutcome<S::Entity>> {
        if self.closed {
            return Err(CrawlError::EngineClosed);
        }

        options.validate()?;
        let mut recorder = DataRecorder::new(options.recorder_config())?;

        let report = match self.crawl(max_pages).await {
            Ok(report) => report,
            Err(e) => {
                close_recorder(&mut recorder);
                return Err(e);
            }
        };

        let saved = persist(&mut recorder, &report.entities, options);
        close_recorder(&mut recorder);
        let saved = saved?;

        Ok(CrawlOutcome { report, saved })
    }

    /// Releases the transport; safe to call more than once
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.transport.close();
        self.closed = true;
        tracing::debug!("{} engine closed", self.spider.name());
    }
}

fn persist<E>(
    recorder: &mut DataRecorder,
    entities: &[E],
    options: &SaveOptions,
) -> CrawlResult<SaveReport>
where
    E: Entity + Clone + Into<crate::entity::Record>,
{
    let outcome = recorder.add_data(entities.iter().cloned(), options.incremental)?;
    if outcome.skipped > 0 {
        tracing::info!("Skipped {} already saved entities", outcome.skipped);
    }

    let written = recorder.record(&options.remove_columns)?;

    Ok(SaveReport {
        added: outcome.added,
        skipped: outcome.skipped,
        written,
        failures: outcome.failures,
    })
}

/// Describes a page cap for log lines
fn page_cap(max_pages: Option<usize>) -> String {
    match max_pages {
        Some(cap) => format!("max {} pages", cap),
        None => "no page cap".to_string(),
    }
}

fn close_recorder(recorder: &mut DataRecorder) {
    if let Err(e) = recorder.close() {
        tracing::warn!("Failed to close recorder: {}", e);
    }
}
