//! Recorder module: batching, deduplication and multi-format persistence
//!
//! A [`DataRecorder`] holds records between [`DataRecorder::add_data`] and
//! [`DataRecorder::record`]. In incremental mode it drops records whose
//! identity is already in the batch or already persisted, and every target
//! reconciles the batch with what it already stores.
//!
//! State machine: `Empty -> Accumulating -> Flushed -> Accumulating ...`,
//! with `Closed` terminal.

mod format;
mod merge;
pub mod sinks;
mod traits;

pub use format::{resolve_targets, OutputFormat};
pub use merge::merge_tables;
pub use traits::{Projection, RecordSink, RecorderError, RecorderResult, Table};

use crate::entity::{EntityError, Fields, Record, ID_FIELD};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration of a recorder's targets
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    /// Output path; its extension picks the format when `formats` is empty
    pub output_path: PathBuf,

    /// Explicit formats, one target each
    pub formats: Vec<OutputFormat>,

    /// Column used to reconcile with persisted data
    pub primary_key: Option<String>,

    /// Table name for SQLite, sheet name for spreadsheets
    pub db_table: String,
}

impl RecorderConfig {
    /// Creates a config for `output_path` with the default key and table name
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            formats: Vec::new(),
            primary_key: Some(ID_FIELD.to_string()),
            db_table: "data".to_string(),
        }
    }

    /// Sets the explicit output formats
    pub fn with_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Sets (or clears) the primary key
    pub fn with_primary_key(mut self, primary_key: Option<String>) -> Self {
        self.primary_key = primary_key;
        self
    }

    /// Sets the table / sheet name
    pub fn with_db_table(mut self, db_table: impl Into<String>) -> Self {
        self.db_table = db_table.into();
        self
    }

    /// Resolves the targets this config writes to
    pub fn targets(&self) -> RecorderResult<Vec<(OutputFormat, PathBuf)>> {
        resolve_targets(&self.output_path, &self.formats)
    }

    /// Checks that incremental writes can be reconciled on every target
    ///
    /// Table targets need a primary key to upsert on.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Incremental mode is usable
    /// * `Err(RecorderError::MissingPrimaryKey)` - A table target has no key
    /// * `Err(RecorderError::UnsupportedFormat)` - Targets cannot be resolved
    pub fn check_incremental(&self) -> RecorderResult<()> {
        if self.primary_key.is_some() {
            return Ok(());
        }

        for (format, path) in self.targets()? {
            if format.is_table() {
                return Err(RecorderError::MissingPrimaryKey(
                    path.display().to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Lifecycle of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Nothing added yet
    Empty,
    /// Holding an unflushed batch
    Accumulating,
    /// Last batch persisted; more data may be added
    Flushed,
    /// Handles released; no further operations
    Closed,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Accumulating => "accumulating",
            Self::Flushed => "flushed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A single record that could not be taken into the batch (or built at all)
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Page the record came from, when produced by a crawl
    pub page: Option<usize>,

    /// Position of the record in its input sequence
    pub index: usize,

    /// Why it was dropped
    pub error: EntityError,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "page {} record {}: {}", page, self.index, self.error),
            None => write!(f, "record {}: {}", self.index, self.error),
        }
    }
}

/// Result of one [`DataRecorder::add_data`] call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddOutcome {
    /// Records appended to the batch
    pub added: usize,

    /// Records skipped as already seen or persisted
    pub skipped: usize,

    /// Records dropped because their identity could not be resolved
    pub failures: Vec<RecordFailure>,
}

/// Batches records and persists them to every configured target
pub struct DataRecorder {
    config: RecorderConfig,
    sinks: Vec<Box<dyn RecordSink>>,
    batch: Vec<Record>,
    batch_ids: HashSet<String>,
    merge_on_flush: bool,
    store_reachable: bool,
    state: RecorderState,
}

impl DataRecorder {
    /// Creates a recorder and opens one sink per resolved target
    ///
    /// # Arguments
    ///
    /// * `config` - Output path, formats, primary key and table name
    ///
    /// # Returns
    ///
    /// * `Ok(DataRecorder)` - All targets resolved and opened
    /// * `Err(RecorderError)` - Unknown format or a target failed to open
    pub fn new(config: RecorderConfig) -> RecorderResult<Self> {
        let targets = config.targets()?;

        let mut opened = Vec::with_capacity(targets.len());
        for (format, path) in targets {
            tracing::debug!("Opening {} target {}", format, path.display());
            opened.push(sinks::open_sink(format, path, &config)?);
        }

        Ok(Self {
            config,
            sinks: opened,
            batch: Vec::new(),
            batch_ids: HashSet::new(),
            merge_on_flush: false,
            store_reachable: true,
            state: RecorderState::Empty,
        })
    }

    /// Returns the recorder configuration
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Returns the current state
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Returns the resolved targets in request order
    pub fn targets(&self) -> Vec<(OutputFormat, &Path)> {
        self.sinks.iter().map(|s| (s.format(), s.target())).collect()
    }

    /// Adds records to the batch
    ///
    /// Accepts anything convertible into a [`Record`]: raw field maps and
    /// entity types alike.
    ///
    /// # Arguments
    ///
    /// * `records` - Records to add, in order
    /// * `incremental` - Skip records already in the batch or persisted
    ///
    /// # Returns
    ///
    /// * `Ok(AddOutcome)` - Counts of added and skipped records, plus failures
    /// * `Err(RecorderError::Closed)` - The recorder was closed
    pub fn add_data<I, R>(&mut self, records: I, incremental: bool) -> RecorderResult<AddOutcome>
    where
        I: IntoIterator<Item = R>,
        R: Into<Record>,
    {
        if self.state == RecorderState::Closed {
            return Err(RecorderError::Closed);
        }

        let mut outcome = AddOutcome::default();

        for (index, record) in records.into_iter().enumerate() {
            let mut record: Record = record.into();

            let id = match record.ensure_id() {
                Ok(id) => id,
                Err(error) if incremental => {
                    tracing::debug!("Dropping record {}: {}", index, error);
                    outcome.failures.push(RecordFailure {
                        page: None,
                        index,
                        error,
                    });
                    continue;
                }
                Err(error) => {
                    tracing::debug!("Appending record {} without identity: {}", index, error);
                    self.batch.push(record);
                    outcome.added += 1;
                    continue;
                }
            };

            if incremental {
                if self.batch_ids.contains(&id) {
                    tracing::debug!("Skipping {}: already in batch", id);
                    outcome.skipped += 1;
                    continue;
                }
                if self.is_persisted(&record) {
                    tracing::debug!("Skipping {}: already persisted", id);
                    outcome.skipped += 1;
                    continue;
                }
            }

            self.batch_ids.insert(id);
            self.batch.push(record);
            outcome.added += 1;
        }

        if incremental {
            self.merge_on_flush = true;
        }
        if !self.batch.is_empty() {
            self.state = RecorderState::Accumulating;
        }

        tracing::debug!(
            "Added {} records ({} skipped, {} failed), batch size {}",
            outcome.added,
            outcome.skipped,
            outcome.failures.len(),
            self.batch.len()
        );

        Ok(outcome)
    }

    /// Checks whether every target already stores this record's primary key
    fn is_persisted(&mut self, record: &Record) -> bool {
        if !self.store_reachable {
            return false;
        }
        let Some(primary_key) = self.config.primary_key.clone() else {
            return false;
        };
        let Some(value) = record.get(&primary_key).and_then(|v| v.as_key()) else {
            return false;
        };

        for sink in self.sinks.iter_mut() {
            match sink.contains_key(&primary_key, &value) {
                Ok(true) => continue,
                Ok(false) => return false,
                Err(e) => {
                    tracing::warn!(
                        "Cannot check existing {} data at {}, skipping store dedup: {}",
                        sink.format(),
                        sink.target().display(),
                        e
                    );
                    self.store_reachable = false;
                    return false;
                }
            }
        }

        true
    }

    /// Persists the batch to every target
    ///
    /// # Arguments
    ///
    /// * `remove_columns` - Columns left out of the output; the batch keeps them
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of records flushed (0 for an empty batch)
    /// * `Err(RecorderError::Flush)` - The first target that failed; the batch is kept
    /// * `Err(RecorderError::Closed)` - The recorder was closed
    pub fn record(&mut self, remove_columns: &[String]) -> RecorderResult<usize> {
        if self.state == RecorderState::Closed {
            return Err(RecorderError::Closed);
        }
        if self.batch.is_empty() {
            tracing::debug!("No data to record");
            return Ok(0);
        }

        let projection = self.project(remove_columns);
        let mut first_error: Option<RecorderError> = None;

        for sink in self.sinks.iter_mut() {
            match sink.write(&projection, self.merge_on_flush) {
                Ok(rows) => {
                    tracing::info!(
                        "Saved {} records to {} ({}, {} rows total)",
                        projection.table.rows.len(),
                        sink.target().display(),
                        sink.format(),
                        rows
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to save {} output to {}: {}",
                        sink.format(),
                        sink.target().display(),
                        e
                    );
                    if first_error.is_none() {
                        first_error = Some(RecorderError::Flush {
                            format: sink.format(),
                            target: sink.target().display().to_string(),
                            source: Box::new(e),
                        });
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let flushed = self.batch.len();
        self.batch.clear();
        self.batch_ids.clear();
        self.merge_on_flush = false;
        self.state = RecorderState::Flushed;

        Ok(flushed)
    }

    /// Builds the outgoing table without touching the batch
    fn project(&self, remove_columns: &[String]) -> Projection {
        let primary_key = self.config.primary_key.clone();

        let removed: Vec<String> = remove_columns
            .iter()
            .filter(|column| {
                if primary_key.as_deref() == Some(column.as_str()) {
                    tracing::warn!("Not removing primary key column '{}'", column);
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        let rows: Vec<Fields> = self.batch.iter().map(|r| r.fields().clone()).collect();
        let mut table = Table::from_rows(rows);
        table.drop_columns(&removed);

        Projection {
            table,
            primary_key,
            removed,
        }
    }

    /// Returns the number of records in the batch
    pub fn get_data_count(&self) -> usize {
        self.batch.len()
    }

    /// Returns snapshots of up to `limit` records from the start of the batch
    pub fn get_sample_data(&self, limit: usize) -> Vec<Fields> {
        self.batch
            .iter()
            .take(limit)
            .map(|r| r.fields().clone())
            .collect()
    }

    /// Drops the batch without persisting it
    pub fn clear_data(&mut self) {
        self.batch.clear();
        self.batch_ids.clear();
        self.merge_on_flush = false;
        if self.state == RecorderState::Accumulating {
            self.state = RecorderState::Empty;
        }
    }

    /// Releases every target handle
    ///
    /// Safe to call more than once. Unflushed records are discarded.
    pub fn close(&mut self) -> RecorderResult<()> {
        if self.state == RecorderState::Closed {
            return Ok(());
        }
        if !self.batch.is_empty() {
            tracing::warn!(
                "Closing recorder with {} unflushed records",
                self.batch.len()
            );
        }

        let mut first_error = None;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close() {
                tracing::warn!("Failed to close {}: {}", sink.target().display(), e);
                first_error.get_or_insert(e);
            }
        }

        self.batch.clear();
        self.batch_ids.clear();
        self.state = RecorderState::Closed;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
