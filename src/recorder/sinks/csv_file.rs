//! CSV output
//!
//! One row per record, header from the projected columns, every value
//! stringified. Empty cells read back as null.

use crate::entity::{FieldValue, Fields};
use crate::recorder::sinks::FileCodec;
use crate::recorder::traits::{RecorderResult, Table};
use crate::recorder::OutputFormat;
use std::path::Path;

/// Codec for comma-separated files
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

impl FileCodec for CsvCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Csv
    }

    fn read(&self, path: &Path) -> RecorderResult<Table> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row = Fields::new();
            for (column, value) in columns.iter().zip(record.iter()) {
                let value = if value.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Text(value.to_string())
                };
                row.insert(column.clone(), value);
            }
            rows.push(row);
        }

        Ok(Table { columns, rows })
    }

    fn write(&self, path: &Path, table: &Table) -> RecorderResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&table.columns)?;

        for row in &table.rows {
            writer.write_record(
                table
                    .columns
                    .iter()
                    .map(|column| Table::cell(row, column).to_string()),
            )?;
        }

        writer.flush()?;
        Ok(())
    }
}
