//! Recorder sink traits and types
//!
//! This module defines the contract every output target implements and the
//! tabular shape rows travel in between the recorder and its sinks.

use crate::entity::{FieldValue, Fields};
use crate::recorder::OutputFormat;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while recording data
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Recorder is closed")]
    Closed,

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Incremental table output to '{0}' requires a primary key")]
    MissingPrimaryKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Malformed {format} file {path}: {message}")]
    Malformed {
        format: OutputFormat,
        path: String,
        message: String,
    },

    #[error("Failed to write {format} output to {target}: {source}")]
    Flush {
        format: OutputFormat,
        target: String,
        source: Box<RecorderError>,
    },
}

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Rows with an explicit column order
///
/// Rows are sparse: a column missing from a row reads as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Fields>,
}

impl Table {
    /// Creates a table, taking the column order from first appearance across rows
    pub fn from_rows(rows: Vec<Fields>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// Returns true if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a cell value, null when absent
    pub fn cell<'a>(row: &'a Fields, column: &str) -> &'a FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        row.get(column).unwrap_or(&NULL)
    }

    /// Removes the given columns from the header and from every row
    pub fn drop_columns(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.columns.retain(|c| !names.contains(c));
        for row in &mut self.rows {
            row.retain(|k, _| !names.contains(k));
        }
    }
}

/// A batch projected for writing, plus what the target needs to reconcile it
#[derive(Debug, Clone)]
pub struct Projection {
    /// Columns and rows to write
    pub table: Table,

    /// Column rows are keyed by when reconciling with persisted data
    pub primary_key: Option<String>,

    /// Columns removed from the output, also stripped from merged existing rows
    pub removed: Vec<String>,
}

/// Trait for output targets
///
/// A sink owns one durable target (a file or a table). Writes must be
/// reconciling: with `merge` set, rows already persisted under the same
/// primary key are replaced rather than duplicated.
pub trait RecordSink {
    /// The format this sink writes
    fn format(&self) -> OutputFormat;

    /// Location of the target
    fn target(&self) -> &Path;

    /// Checks whether a row with this primary key value is already persisted
    ///
    /// # Arguments
    ///
    /// * `primary_key` - The key column
    /// * `value` - The key value to look up
    fn contains_key(&mut self, primary_key: &str, value: &str) -> RecorderResult<bool>;

    /// Writes the projected batch
    ///
    /// # Arguments
    ///
    /// * `projection` - Rows, columns and key information
    /// * `merge` - Reconcile with the existing target instead of replacing it
    ///
    /// # Returns
    ///
    /// The number of rows now held by the target for file sinks, or the
    /// number of rows written for table sinks
    fn write(&mut self, projection: &Projection, merge: bool) -> RecorderResult<usize>;

    /// Releases any held handle; must be safe to call more than once
    fn close(&mut self) -> RecorderResult<()> {
        Ok(())
    }
}
