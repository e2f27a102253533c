//! JSON output: a pretty-printed array of records in column order

use crate::entity::{FieldValue, Fields};
use crate::recorder::sinks::FileCodec;
use crate::recorder::traits::{RecorderError, RecorderResult, Table};
use crate::recorder::OutputFormat;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Codec for JSON array files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl FileCodec for JsonCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn read(&self, path: &Path) -> RecorderResult<Table> {
        let reader = BufReader::new(File::open(path)?);
        let value: serde_json::Value = serde_json::from_reader(reader)?;

        let items = match value {
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(RecorderError::Malformed {
                    format: OutputFormat::Json,
                    path: path.display().to_string(),
                    message: "top-level value is not an array".to_string(),
                })
            }
        };

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let object: IndexMap<String, serde_json::Value> = serde_json::from_value(item)?;
            let row: Fields = object
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from_json(v)))
                .collect();
            rows.push(row);
        }

        Ok(Table::from_rows(rows))
    }

    fn write(&self, path: &Path, table: &Table) -> RecorderResult<()> {
        let objects: Vec<IndexMap<&str, serde_json::Value>> = table
            .rows
            .iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .map(|column| (column.as_str(), Table::cell(row, column).to_json()))
                    .collect()
            })
            .collect();

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &objects)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_preserves_types_and_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");

        let mut row = Fields::new();
        row.insert("id".to_string(), FieldValue::Int(1));
        row.insert("title".to_string(), "Développeur".into());
        row.insert("remote".to_string(), FieldValue::Bool(true));
        row.insert("salary".to_string(), FieldValue::Null);

        JsonCodec
            .write(&path, &Table::from_rows(vec![row.clone()]))
            .unwrap();
        let read = JsonCodec.read(&path).unwrap();

        assert_eq!(read.columns, vec!["id", "title", "remote", "salary"]);
        assert_eq!(read.rows, vec![row]);
    }

    #[test]
    fn test_missing_cells_are_written_as_null() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sparse.json");

        let mut a = Fields::new();
        a.insert("id".to_string(), "1".into());
        a.insert("name".to_string(), "a".into());
        let mut b = Fields::new();
        b.insert("id".to_string(), "2".into());

        JsonCodec.write(&path, &Table::from_rows(vec![a, b])).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(parsed[1]["name"], serde_json::Value::Null);
    }

    #[test]
    fn test_rejects_non_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"id": 1}"#).unwrap();

        assert!(matches!(
            JsonCodec.read(&path),
            Err(RecorderError::Malformed { .. })
        ));
    }
}
