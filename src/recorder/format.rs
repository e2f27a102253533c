//! Output format selection
//!
//! Formats are picked from an explicit list or from the output path's
//! extension, once, when the recorder is built.

use crate::recorder::traits::{RecorderError, RecorderResult};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Comma-separated tabular file
    Csv,
    /// JSON array of records
    Json,
    /// Markdown pipe table
    Markdown,
    /// SQLite table
    Sqlite,
    /// xlsx workbook with one sheet
    Spreadsheet,
}

impl OutputFormat {
    /// Returns all formats
    pub fn all() -> [Self; 5] {
        [
            Self::Csv,
            Self::Json,
            Self::Markdown,
            Self::Sqlite,
            Self::Spreadsheet,
        ]
    }

    /// Canonical configuration name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Sqlite => "sqlite",
            Self::Spreadsheet => "excel",
        }
    }

    /// File extension written for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Sqlite => "db",
            Self::Spreadsheet => "xlsx",
        }
    }

    /// Parses a configuration name
    pub fn from_name(name: &str) -> RecorderResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "sqlite" | "db" => Ok(Self::Sqlite),
            "excel" | "xlsx" | "spreadsheet" => Ok(Self::Spreadsheet),
            _ => Err(RecorderError::UnsupportedFormat(name.to_string())),
        }
    }

    /// Maps a file extension to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "md" | "markdown" => Some(Self::Markdown),
            "db" | "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "xlsx" => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    /// Returns true for formats backed by a relational table
    pub fn is_table(&self) -> bool {
        matches!(self, Self::Sqlite)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Resolves the concrete target path for each requested format
///
/// With no explicit formats, the single format comes from `path`'s extension.
/// With explicit formats, each target is `path` (minus a known extension)
/// plus the format's extension. Duplicate formats collapse to one target.
///
/// # Returns
///
/// * `Ok(Vec<(OutputFormat, PathBuf)>)` - One entry per target, in request order
/// * `Err(RecorderError::UnsupportedFormat)` - The extension is not recognized
pub fn resolve_targets(
    path: &Path,
    formats: &[OutputFormat],
) -> RecorderResult<Vec<(OutputFormat, PathBuf)>> {
    let extension = path.extension().and_then(|e| e.to_str());

    if formats.is_empty() {
        let format = extension
            .and_then(OutputFormat::from_extension)
            .ok_or_else(|| RecorderError::UnsupportedFormat(path.display().to_string()))?;
        return Ok(vec![(format, path.to_path_buf())]);
    }

    let base = match extension.and_then(OutputFormat::from_extension) {
        Some(_) => path.with_extension(""),
        None => path.to_path_buf(),
    };

    let mut targets: Vec<(OutputFormat, PathBuf)> = Vec::new();
    for format in formats {
        if targets.iter().any(|(f, _)| f == format) {
            continue;
        }
        let mut target: OsString = base.clone().into_os_string();
        target.push(".");
        target.push(format.extension());
        targets.push((*format, PathBuf::from(target)));
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_aliases() {
        assert_eq!(OutputFormat::from_name("CSV").unwrap(), OutputFormat::Csv);
        assert_eq!(
            OutputFormat::from_name("excel").unwrap(),
            OutputFormat::Spreadsheet
        );
        assert_eq!(
            OutputFormat::from_name("md").unwrap(),
            OutputFormat::Markdown
        );
        assert!(matches!(
            OutputFormat::from_name("parquet"),
            Err(RecorderError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_name_roundtrip() {
        for format in OutputFormat::all() {
            assert_eq!(OutputFormat::from_name(format.name()).unwrap(), format);
            assert_eq!(
                OutputFormat::from_extension(format.extension()),
                Some(format)
            );
        }
    }

    #[test]
    fn test_resolve_from_extension() {
        let targets = resolve_targets(Path::new("out/jobs.csv"), &[]).unwrap();
        assert_eq!(
            targets,
            vec![(OutputFormat::Csv, PathBuf::from("out/jobs.csv"))]
        );
    }

    #[test]
    fn test_resolve_unknown_extension_fails() {
        let result = resolve_targets(Path::new("out/jobs.parquet"), &[]);
        assert!(matches!(result, Err(RecorderError::UnsupportedFormat(_))));

        let result = resolve_targets(Path::new("out/jobs"), &[]);
        assert!(matches!(result, Err(RecorderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_resolve_explicit_formats() {
        let targets = resolve_targets(
            Path::new("data/easynomad_jobs"),
            &[
                OutputFormat::Csv,
                OutputFormat::Sqlite,
                OutputFormat::Csv,
                OutputFormat::Spreadsheet,
            ],
        )
        .unwrap();

        assert_eq!(
            targets,
            vec![
                (OutputFormat::Csv, PathBuf::from("data/easynomad_jobs.csv")),
                (OutputFormat::Sqlite, PathBuf::from("data/easynomad_jobs.db")),
                (
                    OutputFormat::Spreadsheet,
                    PathBuf::from("data/easynomad_jobs.xlsx")
                ),
            ]
        );
    }

    #[test]
    fn test_resolve_strips_known_extension() {
        let targets =
            resolve_targets(Path::new("jobs.csv"), &[OutputFormat::Markdown]).unwrap();
        assert_eq!(targets[0].1, PathBuf::from("jobs.md"));

        let targets = resolve_targets(Path::new("jobs.v2"), &[OutputFormat::Json]).unwrap();
        assert_eq!(targets[0].1, PathBuf::from("jobs.v2.json"));
    }
}
