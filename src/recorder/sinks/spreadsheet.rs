//! Spreadsheet (.xlsx) output
//!
//! Written with `rust_xlsxwriter`, read back with `calamine` so existing
//! workbooks can be merged. The sheet is named after the configured table.

use crate::entity::{FieldValue, Fields};
use crate::recorder::sinks::FileCodec;
use crate::recorder::traits::{RecorderError, RecorderResult, Table};
use crate::recorder::OutputFormat;
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::path::Path;

/// Excel sheet names are capped at 31 characters
const MAX_SHEET_NAME: usize = 31;

/// Longest text Excel stores in one cell
const MAX_CELL_TEXT: usize = 32_767;

/// Largest integer an xlsx number cell holds exactly (2^53)
const MAX_EXACT_INT: i64 = 1 << 53;

/// Codec for single-sheet workbooks
#[derive(Debug, Clone)]
pub struct SpreadsheetCodec {
    sheet: String,
}

impl SpreadsheetCodec {
    /// Creates a codec writing to the named sheet
    ///
    /// Characters Excel rejects in sheet names are replaced with `_`.
    pub fn new(sheet: &str) -> Self {
        let mut name: String = sheet
            .chars()
            .map(|c| match c {
                '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
                other => other,
            })
            .take(MAX_SHEET_NAME)
            .collect();
        if name.trim().is_empty() {
            name = "data".to_string();
        }
        Self { sheet: name }
    }

    /// Name of the sheet rows are written to
    pub fn sheet(&self) -> &str {
        &self.sheet
    }
}

impl FileCodec for SpreadsheetCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Spreadsheet
    }

    fn read(&self, path: &Path) -> RecorderResult<Table> {
        let mut workbook: Xlsx<_> = open_workbook(path).map_err(spreadsheet_error)?;

        let sheet = if workbook.sheet_names().iter().any(|s| s == &self.sheet) {
            self.sheet.clone()
        } else {
            match workbook.sheet_names().first() {
                Some(first) => {
                    tracing::debug!(
                        "Sheet '{}' not found in {}, reading '{}'",
                        self.sheet,
                        path.display(),
                        first
                    );
                    first.clone()
                }
                None => return Ok(Table::default()),
            }
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(spreadsheet_error)?;

        let mut lines = range.rows();
        let columns: Vec<String> = match lines.next() {
            Some(header) => header.iter().map(|cell| cell.to_string()).collect(),
            None => return Ok(Table::default()),
        };

        let mut rows = Vec::new();
        for line in lines {
            let mut row = Fields::new();
            for (column, cell) in columns.iter().zip(line.iter()) {
                row.insert(column.clone(), cell_value(cell));
            }
            rows.push(row);
        }

        Ok(Table { columns, rows })
    }

    fn write(&self, path: &Path, table: &Table) -> RecorderResult<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet).map_err(spreadsheet_error)?;

        for (col, column) in table.columns.iter().enumerate() {
            worksheet
                .write_string(0, col as u16, column)
                .map_err(spreadsheet_error)?;
        }

        for (index, row) in table.rows.iter().enumerate() {
            let line = (index + 1) as u32;
            for (col, column) in table.columns.iter().enumerate() {
                let col = col as u16;
                match Table::cell(row, column) {
                    FieldValue::Null => continue,
                    FieldValue::Bool(b) => worksheet.write_boolean(line, col, *b),
                    FieldValue::Int(i) if i.unsigned_abs() <= MAX_EXACT_INT as u64 => {
                        worksheet.write_number(line, col, *i as f64)
                    }
                    // Stored as text so the value reads back unchanged
                    FieldValue::Int(i) => worksheet.write_string(line, col, i.to_string()),
                    FieldValue::Float(f) => worksheet.write_number(line, col, *f),
                    FieldValue::Text(s) => {
                        worksheet.write_string(line, col, fit_cell_text(s, path, column))
                    }
                }
                .map_err(spreadsheet_error)?;
            }
        }

        workbook.save(path).map_err(spreadsheet_error)?;
        Ok(())
    }
}

/// Cuts text down to Excel's cell limit
fn fit_cell_text<'a>(text: &'a str, path: &Path, column: &str) -> &'a str {
    match text.char_indices().nth(MAX_CELL_TEXT) {
        Some((end, _)) => {
            tracing::warn!(
                "Truncating '{}' in {} to {} characters",
                column,
                path.display(),
                MAX_CELL_TEXT
            );
            &text[..end]
        }
        None => text,
    }
}

fn cell_value(cell: &Data) -> FieldValue {
    match cell {
        Data::Empty => FieldValue::Null,
        Data::Int(i) => FieldValue::Int(*i),
        Data::Float(f) => FieldValue::Float(*f),
        Data::Bool(b) => FieldValue::Bool(*b),
        Data::String(s) if s.is_empty() => FieldValue::Null,
        Data::String(s) => FieldValue::Text(s.clone()),
        other => FieldValue::Text(other.to_string()),
    }
}

fn spreadsheet_error(e: impl std::fmt::Display) -> RecorderError {
    RecorderError::Spreadsheet(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sheet_name_is_sanitized() {
        assert_eq!(SpreadsheetCodec::new("jobs/2024").sheet(), "jobs_2024");
        assert_eq!(SpreadsheetCodec::new("").sheet(), "data");
        assert_eq!(SpreadsheetCodec::new(&"x".repeat(40)).sheet().len(), 31);
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.xlsx");
        let codec = SpreadsheetCodec::new("jobs");

        let mut first = Fields::new();
        first.insert("id".to_string(), FieldValue::from("a1"));
        first.insert("count".to_string(), FieldValue::Int(3));
        let mut second = Fields::new();
        second.insert("id".to_string(), FieldValue::from("b2"));
        second.insert("remote".to_string(), FieldValue::Bool(true));

        codec
            .write(&path, &Table::from_rows(vec![first, second]))
            .unwrap();
        let read = codec.read(&path).unwrap();

        assert_eq!(read.columns, vec!["id", "count", "remote"]);
        assert_eq!(read.rows.len(), 2);
        assert_eq!(
            read.rows[0].get("count").and_then(|v| v.as_key()),
            Some("3".to_string())
        );
        assert_eq!(read.rows[1].get("remote"), Some(&FieldValue::Bool(true)));
        assert!(read.rows[1]
            .get("count")
            .map_or(true, |v| v.is_null()));
    }

    #[test]
    fn test_large_integers_read_back_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.xlsx");
        let codec = SpreadsheetCodec::new("jobs");

        let mut row = Fields::new();
        row.insert("id".to_string(), FieldValue::Int(9_007_199_254_740_993));
        row.insert("small".to_string(), FieldValue::Int(-42));
        codec.write(&path, &Table::from_rows(vec![row])).unwrap();

        let read = codec.read(&path).unwrap();
        assert_eq!(
            read.rows[0].get("id").and_then(|v| v.as_key()),
            Some("9007199254740993".to_string())
        );
        assert_eq!(
            read.rows[0].get("small").and_then(|v| v.as_key()),
            Some("-42".to_string())
        );
    }

    #[test]
    fn test_long_text_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.xlsx");
        let codec = SpreadsheetCodec::new("jobs");

        let mut row = Fields::new();
        row.insert("id".to_string(), FieldValue::from("a1"));
        row.insert("description".to_string(), FieldValue::from("é".repeat(40_000)));
        codec.write(&path, &Table::from_rows(vec![row])).unwrap();

        let read = codec.read(&path).unwrap();
        let description = read.rows[0].get("description").and_then(|v| v.as_key()).unwrap();
        assert_eq!(description.chars().count(), MAX_CELL_TEXT);
        assert_eq!(read.rows[0].get("id"), Some(&FieldValue::from("a1")));
    }

    #[test]
    fn test_read_falls_back_to_first_sheet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.xlsx");

        let mut row = Fields::new();
        row.insert("id".to_string(), FieldValue::from("x"));
        SpreadsheetCodec::new("first")
            .write(&path, &Table::from_rows(vec![row]))
            .unwrap();

        let read = SpreadsheetCodec::new("second").read(&path).unwrap();
        assert_eq!(read.rows.len(), 1);
    }
}
