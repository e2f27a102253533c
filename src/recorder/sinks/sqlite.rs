//! SQLite output
//!
//! Rows land in a single table whose columns are all TEXT. The table grows new
//! columns as they appear. With a primary key, writes upsert on that key and
//! lookups query it directly, so existing rows are never loaded wholesale.

use crate::recorder::traits::{Projection, RecordSink, RecorderError, RecorderResult, Table};
use crate::recorder::OutputFormat;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite table target
pub struct SqliteSink {
    conn: Option<Connection>,
    path: PathBuf,
    table: String,
    primary_key: Option<String>,
}

impl SqliteSink {
    /// Opens (or creates) the database and the target table
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `table` - Table rows are written to
    /// * `primary_key` - Column used for upserts and lookups
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Database opened and table ready
    /// * `Err(RecorderError)` - Failed to open the database or create the table
    pub fn open(path: &Path, table: &str, primary_key: Option<String>) -> RecorderResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        let sink = Self {
            conn: Some(conn),
            path: path.to_path_buf(),
            table: table.to_string(),
            primary_key,
        };
        sink.initialize()?;
        Ok(sink)
    }

    /// Creates a sink over an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(table: &str, primary_key: Option<String>) -> RecorderResult<Self> {
        let sink = Self {
            conn: Some(Connection::open_in_memory()?),
            path: PathBuf::from(":memory:"),
            table: table.to_string(),
            primary_key,
        };
        sink.initialize()?;
        Ok(sink)
    }

    fn conn(&self) -> RecorderResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or(RecorderError::Closed)
    }

    /// Creates the table with just the key column, if it does not exist yet
    fn initialize(&self) -> RecorderResult<()> {
        let columns = self.existing_columns()?;
        if !columns.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        match &self.primary_key {
            Some(key) => {
                conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY)",
                        quote(&self.table),
                        quote(key)
                    ),
                    [],
                )?;
            }
            None => {
                conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS {} (_rowid INTEGER PRIMARY KEY AUTOINCREMENT)",
                        quote(&self.table)
                    ),
                    [],
                )?;
            }
        }

        tracing::debug!("Created table {} in {}", self.table, self.path.display());
        Ok(())
    }

    fn existing_columns(&self) -> RecorderResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(&self.table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Adds missing columns and, for keyed tables created elsewhere, the unique index
    fn ensure_schema(&self, columns: &[String]) -> RecorderResult<()> {
        let existing = self.existing_columns()?;
        let conn = self.conn()?;

        for column in columns {
            if !existing.iter().any(|c| c == column) {
                conn.execute(
                    &format!(
                        "ALTER TABLE {} ADD COLUMN {} TEXT",
                        quote(&self.table),
                        quote(column)
                    ),
                    [],
                )?;
                tracing::debug!("Added column {} to table {}", column, self.table);
            }
        }

        if let Some(key) = &self.primary_key {
            conn.execute(
                &format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote(&format!("idx_{}_{}", self.table, key)),
                    quote(&self.table),
                    quote(key)
                ),
                [],
            )?;
        }

        Ok(())
    }

    fn insert_sql(&self, columns: &[String]) -> String {
        let names: Vec<String> = columns.iter().map(|c| quote(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&self.table),
            names.join(", "),
            placeholders.join(", ")
        );

        if let Some(key) = &self.primary_key {
            let updates: Vec<String> = columns
                .iter()
                .filter(|c| *c != key)
                .map(|c| format!("{0} = excluded.{0}", quote(c)))
                .collect();
            if updates.is_empty() {
                sql.push_str(&format!(" ON CONFLICT({}) DO NOTHING", quote(key)));
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT({}) DO UPDATE SET {}",
                    quote(key),
                    updates.join(", ")
                ));
            }
        }

        sql
    }
}

impl RecordSink for SqliteSink {
    fn format(&self) -> OutputFormat {
        OutputFormat::Sqlite
    }

    fn target(&self) -> &Path {
        &self.path
    }

    fn contains_key(&mut self, primary_key: &str, value: &str) -> RecorderResult<bool> {
        let existing = self.existing_columns()?;
        if !existing.iter().any(|c| c == primary_key) {
            return Ok(false);
        }

        let found = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
                    quote(&self.table),
                    quote(primary_key)
                ),
                params![value],
                |_| Ok(()),
            )
            .optional()?;

        Ok(found.is_some())
    }

    /// Tables are always reconciled by key; `merge` only matters for files
    fn write(&mut self, projection: &Projection, _merge: bool) -> RecorderResult<usize> {
        let columns = &projection.table.columns;
        if columns.is_empty() {
            return Ok(0);
        }

        self.ensure_schema(columns)?;
        let sql = self.insert_sql(columns);

        let conn = self
            .conn
            .as_mut()
            .ok_or(RecorderError::Closed)?;
        let tx = conn.transaction()?;

        let mut written = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &projection.table.rows {
                let values: Vec<Option<String>> = columns
                    .iter()
                    .map(|column| {
                        let value = Table::cell(row, column);
                        if value.is_null() {
                            None
                        } else {
                            Some(value.to_string())
                        }
                    })
                    .collect();
                written += stmt.execute(params_from_iter(values))?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            "Wrote {} rows to table {} in {}",
            written,
            self.table,
            self.path.display()
        );
        Ok(written)
    }

    fn close(&mut self) -> RecorderResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }
}

/// Quotes an SQL identifier
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
