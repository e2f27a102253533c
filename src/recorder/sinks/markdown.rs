//! Markdown table output
//!
//! Renders the projection as a pipe table and parses tables written by
//! [`format_markdown_table`] back, so the file can be merged like any other
//! target. Cell text escapes `\`, `|` and line breaks, plus leading and
//! trailing whitespace so padded values read back unchanged.

use crate::entity::{FieldValue, Fields};
use crate::recorder::sinks::FileCodec;
use crate::recorder::traits::{RecorderError, RecorderResult, Table};
use crate::recorder::OutputFormat;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Codec for Markdown table files
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownCodec;

impl FileCodec for MarkdownCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Markdown
    }

    fn read(&self, path: &Path) -> RecorderResult<Table> {
        let content = std::fs::read_to_string(path)?;
        parse_markdown_table(&content).map_err(|message| RecorderError::Malformed {
            format: OutputFormat::Markdown,
            path: path.display().to_string(),
            message,
        })
    }

    fn write(&self, path: &Path, table: &Table) -> RecorderResult<()> {
        let markdown = format_markdown_table(table);

        let mut file = File::create(path)?;
        file.write_all(markdown.as_bytes())?;

        Ok(())
    }
}

/// Formats a table as Markdown
///
/// # Arguments
///
/// * `table` - Columns and rows to render
///
/// # Returns
///
/// The header line, the `---` separator line and one line per row
pub fn format_markdown_table(table: &Table) -> String {
    let mut md = String::new();

    let header: Vec<String> = table.columns.iter().map(|c| escape_cell(c)).collect();
    md.push_str(&format!("| {} |\n", header.join(" | ")));
    md.push_str(&format!(
        "| {} |\n",
        vec!["---"; table.columns.len()].join(" | ")
    ));

    for row in &table.rows {
        let cells: Vec<String> = table
            .columns
            .iter()
            .map(|column| escape_cell(&Table::cell(row, column).to_string()))
            .collect();
        md.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    md
}

/// Parses a Markdown pipe table
///
/// Empty cells read back as null; every other cell is text.
///
/// # Returns
///
/// * `Ok(Table)` - The parsed table (empty input gives an empty table)
/// * `Err(String)` - Description of the malformed line
pub fn parse_markdown_table(content: &str) -> Result<Table, String> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    let columns = match lines.next() {
        Some(header) => split_row(header)?,
        None => return Ok(Table::default()),
    };

    match lines.next() {
        Some(separator) if is_separator(separator) => {}
        Some(other) => return Err(format!("expected separator line, found '{}'", other)),
        None => return Err("missing separator line".to_string()),
    }

    let mut rows = Vec::new();
    for line in lines {
        let cells = split_row(line)?;
        let mut row = Fields::new();
        for (column, cell) in columns.iter().zip(cells) {
            let value = if cell.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Text(cell)
            };
            row.insert(column.clone(), value);
        }
        rows.push(row);
    }

    Ok(Table { columns, rows })
}

fn escape_cell(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>");
    protect_edges(&escaped)
}

/// Backslash-escapes leading and trailing whitespace, which the reader trims
fn protect_edges(text: &str) -> String {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len().max(start);
    if start == 0 && end == text.len() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text[..start].chars() {
        out.push('\\');
        out.push(c);
    }
    out.push_str(&text[start..end]);
    for c in text[end..].chars() {
        out.push('\\');
        out.push(c);
    }
    out
}

fn is_separator(line: &str) -> bool {
    line.starts_with('|')
        && line
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Splits `| a | b |` into unescaped, trimmed cells
///
/// Escaped characters are never trimmed.
fn split_row(line: &str) -> Result<Vec<String>, String> {
    let inner = line
        .strip_prefix('|')
        .ok_or_else(|| format!("row does not start with '|': '{}'", line))?;

    let mut cells = Vec::new();
    let mut current = String::new();
    // Length of `current` up to and including the last escaped character
    let mut protected = 0;
    let mut chars = inner.chars();
    let mut closed = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(chars.next().unwrap_or('\\'));
                protected = current.len();
            }
            '|' => {
                let keep = protected + current[protected..].trim_end().len();
                cells.push(current[..keep].replace("<br>", "\n"));
                current.clear();
                protected = 0;
                closed = true;
                continue;
            }
            other if other.is_whitespace() && current.is_empty() => {}
            other => current.push(other),
        }
        closed = false;
    }

    if !closed {
        return Err(format!("row does not end with '|': '{}'", line));
    }

    Ok(cells)
}
