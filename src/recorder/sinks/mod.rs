//! Concrete output targets
//!
//! File formats share [`FileSink`], which handles key lookup and
//! merge-then-rewrite; each format only supplies a [`FileCodec`]. The SQLite
//! target reconciles through primary-key upserts instead.

mod csv_file;
mod json_file;
mod markdown;
mod spreadsheet;
mod sqlite;

pub use csv_file::CsvCodec;
pub use json_file::JsonCodec;
pub use markdown::{format_markdown_table, parse_markdown_table, MarkdownCodec};
pub use spreadsheet::SpreadsheetCodec;
pub use sqlite::SqliteSink;

use crate::recorder::merge::merge_tables;
use crate::recorder::traits::{Projection, RecordSink, RecorderResult, Table};
use crate::recorder::{OutputFormat, RecorderConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Reads and writes a whole table in one file format
pub trait FileCodec {
    /// The format this codec handles
    fn format(&self) -> OutputFormat;

    /// Reads the full table stored at `path`
    fn read(&self, path: &Path) -> RecorderResult<Table>;

    /// Replaces the file at `path` with `table`
    fn write(&self, path: &Path, table: &Table) -> RecorderResult<()>;
}

/// A file target reconciled by reading, merging and rewriting the whole file
pub struct FileSink<C: FileCodec> {
    codec: C,
    path: PathBuf,
    /// Primary key values known to be in the file, loaded on first lookup
    known_keys: Option<(String, HashSet<String>)>,
}

impl<C: FileCodec> FileSink<C> {
    /// Creates a sink for `path`; nothing is read until needed
    pub fn new(codec: C, path: PathBuf) -> Self {
        Self {
            codec,
            path,
            known_keys: None,
        }
    }

    fn load_keys(&self, primary_key: &str) -> RecorderResult<HashSet<String>> {
        let table = self.codec.read(&self.path)?;
        let keys: HashSet<String> = table
            .rows
            .iter()
            .filter_map(|row| row.get(primary_key).and_then(|v| v.as_key()))
            .collect();

        tracing::debug!(
            "Loaded {} existing keys from {}",
            keys.len(),
            self.path.display()
        );
        Ok(keys)
    }
}

impl<C: FileCodec> RecordSink for FileSink<C> {
    fn format(&self) -> OutputFormat {
        self.codec.format()
    }

    fn target(&self) -> &Path {
        &self.path
    }

    fn contains_key(&mut self, primary_key: &str, value: &str) -> RecorderResult<bool> {
        if !self.path.exists() {
            self.known_keys = None;
            return Ok(false);
        }

        let stale = match &self.known_keys {
            Some((column, _)) => column != primary_key,
            None => true,
        };
        if stale {
            let keys = self.load_keys(primary_key)?;
            self.known_keys = Some((primary_key.to_string(), keys));
        }

        Ok(self
            .known_keys
            .as_ref()
            .is_some_and(|(_, keys)| keys.contains(value)))
    }

    fn write(&mut self, projection: &Projection, merge: bool) -> RecorderResult<usize> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let table = if merge && self.path.exists() {
            let mut existing = self.codec.read(&self.path)?;
            existing.drop_columns(&projection.removed);
            let before = existing.rows.len();
            let merged = merge_tables(
                existing,
                &projection.table,
                projection.primary_key.as_deref(),
            );
            tracing::debug!(
                "Merged {} new rows into {} existing rows of {}",
                projection.table.rows.len(),
                before,
                self.path.display()
            );
            merged
        } else {
            projection.table.clone()
        };

        self.codec.write(&self.path, &table)?;

        if let Some(key) = &projection.primary_key {
            let keys: HashSet<String> = table
                .rows
                .iter()
                .filter_map(|row| row.get(key).and_then(|v| v.as_key()))
                .collect();
            self.known_keys = Some((key.clone(), keys));
        } else {
            self.known_keys = None;
        }

        Ok(table.rows.len())
    }
}

/// Opens the sink for one resolved target
///
/// # Arguments
///
/// * `format` - Output format of the target
/// * `path` - Resolved target path
/// * `config` - Recorder configuration (table name, primary key)
pub fn open_sink(
    format: OutputFormat,
    path: PathBuf,
    config: &RecorderConfig,
) -> RecorderResult<Box<dyn RecordSink>> {
    let sink: Box<dyn RecordSink> = match format {
        OutputFormat::Csv => Box::new(FileSink::new(CsvCodec, path)),
        OutputFormat::Json => Box::new(FileSink::new(JsonCodec, path)),
        OutputFormat::Markdown => Box::new(FileSink::new(MarkdownCodec, path)),
        OutputFormat::Spreadsheet => Box::new(FileSink::new(
            SpreadsheetCodec::new(&config.db_table),
            path,
        )),
        OutputFormat::Sqlite => Box::new(SqliteSink::open(
            &path,
            &config.db_table,
            config.primary_key.clone(),
        )?),
    };
    Ok(sink)
}
