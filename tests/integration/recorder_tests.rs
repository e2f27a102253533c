//! Integration tests for the recorder
//!
//! Each test writes real files into a temporary directory and reads them
//! back through the same codecs (or straight from SQLite).

use nomad_harvest::entity::{Entity, FieldValue, Fields, JobEntity, Record};
use nomad_harvest::recorder::sinks::{
    CsvCodec, FileCodec, JsonCodec, MarkdownCodec, SpreadsheetCodec,
};
use nomad_harvest::recorder::{DataRecorder, OutputFormat, RecorderConfig, Table};
use std::path::Path;
use tempfile::TempDir;

fn row(id: &str, title: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("id".to_string(), FieldValue::from(id));
    fields.insert("title".to_string(), FieldValue::from(title));
    fields.insert("salary".to_string(), FieldValue::from("25k"));
    fields
}

fn read_table(format: OutputFormat, path: &Path, table: &str) -> Table {
    match format {
        OutputFormat::Csv => CsvCodec.read(path).unwrap(),
        OutputFormat::Json => JsonCodec.read(path).unwrap(),
        OutputFormat::Markdown => MarkdownCodec.read(path).unwrap(),
        OutputFormat::Spreadsheet => SpreadsheetCodec::new(table).read(path).unwrap(),
        OutputFormat::Sqlite => read_sqlite(path, table),
    }
}

fn read_sqlite(path: &Path, table: &str) -> Table {
    let conn = rusqlite::Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare(&format!("SELECT \"id\", \"title\" FROM \"{}\"", table))
        .unwrap();
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let title: Option<String> = r.get(1)?;
            let mut fields = Fields::new();
            fields.insert("id".to_string(), FieldValue::from(id));
            fields.insert(
                "title".to_string(),
                title.map(FieldValue::from).unwrap_or_default(),
            );
            Ok(fields)
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    Table::from_rows(rows)
}

fn sorted_ids(table: &Table) -> Vec<String> {
    let mut ids: Vec<String> = table
        .rows
        .iter()
        .filter_map(|r| r.get("id").and_then(|v| v.as_key()))
        .collect();
    ids.sort();
    ids
}

fn title_of(table: &Table, id: &str) -> Option<String> {
    table
        .rows
        .iter()
        .find(|r| r.get("id").and_then(|v| v.as_key()).as_deref() == Some(id))
        .and_then(|r| r.get("title"))
        .and_then(|v| v.as_key())
}

/// Two incremental sessions against every format: the second brings one
/// new record and one that is already stored
#[test]
fn test_incremental_sessions_merge_in_every_format() {
    let dir = TempDir::new().unwrap();
    let config = RecorderConfig::new(dir.path().join("jobs"))
        .with_formats(OutputFormat::all().to_vec())
        .with_db_table("jobs");

    let mut first = DataRecorder::new(config.clone()).unwrap();
    first
        .add_data(vec![row("1", "one"), row("2", "two")], true)
        .unwrap();
    assert_eq!(first.record(&[]).unwrap(), 2);
    first.close().unwrap();

    let mut second = DataRecorder::new(config.clone()).unwrap();
    let outcome = second
        .add_data(vec![row("2", "two v2"), row("3", "three")], true)
        .unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(second.record(&[]).unwrap(), 1);
    second.close().unwrap();

    for (format, path) in config.targets().unwrap() {
        let table = read_table(format, &path, "jobs");
        assert_eq!(
            sorted_ids(&table),
            vec!["1", "2", "3"],
            "unexpected rows in {}",
            format
        );
        assert_eq!(title_of(&table, "2").as_deref(), Some("two"), "{}", format);
        assert_eq!(title_of(&table, "3").as_deref(), Some("three"), "{}", format);
    }
}

fn keyed_row(id: FieldValue, title: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("id".to_string(), id);
    fields.insert("title".to_string(), FieldValue::from(title));
    fields
}

/// Keys that a text or float based format could alter on the way back in
#[test]
fn test_incremental_sessions_keep_exact_keys_in_every_format() {
    let dir = TempDir::new().unwrap();
    let config = RecorderConfig::new(dir.path().join("jobs"))
        .with_formats(OutputFormat::all().to_vec())
        .with_db_table("jobs");

    let batch = || {
        vec![
            keyed_row(FieldValue::Int(42), "small int"),
            keyed_row(FieldValue::Int(9_007_199_254_740_993), "large int"),
            keyed_row(FieldValue::from(" J-7 "), "padded"),
        ]
    };

    let mut first = DataRecorder::new(config.clone()).unwrap();
    let mut rows = batch();
    rows[0].insert("description".to_string(), FieldValue::from("x".repeat(40_000)));
    first.add_data(rows, true).unwrap();
    assert_eq!(first.record(&[]).unwrap(), 3);
    first.close().unwrap();

    let mut second = DataRecorder::new(config.clone()).unwrap();
    let mut rows = batch();
    rows.push(keyed_row(FieldValue::from("J-8"), "new"));
    let outcome = second.add_data(rows, true).unwrap();
    assert_eq!(outcome.skipped, 3);
    assert_eq!(outcome.added, 1);
    assert_eq!(second.record(&[]).unwrap(), 1);
    second.close().unwrap();

    for (format, path) in config.targets().unwrap() {
        let table = read_table(format, &path, "jobs");
        assert_eq!(
            sorted_ids(&table),
            vec![" J-7 ", "42", "9007199254740993", "J-8"],
            "unexpected rows in {}",
            format
        );
    }
}

#[test]
fn test_incremental_resave_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");
    let rows = vec![row("a", "alpha"), row("b", "beta")];

    for session in 0..3 {
        let mut rec = DataRecorder::new(RecorderConfig::new(&path)).unwrap();
        let outcome = rec.add_data(rows.clone(), true).unwrap();
        if session == 0 {
            assert_eq!(outcome.added, 2);
        } else {
            assert_eq!(outcome.added, 0);
            assert_eq!(outcome.skipped, 2);
        }
        rec.record(&[]).unwrap();
        rec.close().unwrap();
    }

    let table = JsonCodec.read(&path).unwrap();
    assert_eq!(table.rows.len(), 2);
}

#[test]
fn test_removed_columns_leave_entities_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.csv");

    let mut fields = row("7", "Rust Engineer");
    fields.insert("company".to_string(), FieldValue::from("Nomad Co"));
    let jobs = vec![JobEntity::from_fields(fields)];

    let mut rec = DataRecorder::new(RecorderConfig::new(&path)).unwrap();
    rec.add_data(jobs.iter().cloned(), true).unwrap();
    let remove = vec!["salary".to_string(), "id".to_string()];
    assert_eq!(rec.record(&remove).unwrap(), 1);
    rec.close().unwrap();

    let table = CsvCodec.read(&path).unwrap();
    assert!(!table.columns.contains(&"salary".to_string()));
    // The key column survives removal
    assert!(table.columns.contains(&"id".to_string()));

    assert_eq!(jobs[0].salary(), Some("25k".to_string()));
}

#[test]
fn test_record_present_in_only_some_targets_is_rewritten() {
    let dir = TempDir::new().unwrap();
    let config = RecorderConfig::new(dir.path().join("jobs"))
        .with_formats(vec![OutputFormat::Csv, OutputFormat::Markdown]);

    let mut rec = DataRecorder::new(config.clone()).unwrap();
    rec.add_data(vec![row("1", "one")], true).unwrap();
    rec.record(&[]).unwrap();
    rec.close().unwrap();

    std::fs::remove_file(dir.path().join("jobs.md")).unwrap();

    let mut rec = DataRecorder::new(config).unwrap();
    let outcome = rec.add_data(vec![row("1", "one")], true).unwrap();
    assert_eq!(outcome.added, 1);
    rec.record(&[]).unwrap();
    rec.close().unwrap();

    let markdown = MarkdownCodec.read(&dir.path().join("jobs.md")).unwrap();
    assert_eq!(sorted_ids(&markdown), vec!["1"]);
    let csv = CsvCodec.read(&dir.path().join("jobs.csv")).unwrap();
    assert_eq!(sorted_ids(&csv), vec!["1"]);
}

#[test]
fn test_identity_is_deterministic() {
    let mut a = Fields::new();
    a.insert("title".to_string(), FieldValue::from("Rust Engineer"));
    a.insert("company".to_string(), FieldValue::from("Nomad Co"));
    a.insert("crawl_time".to_string(), FieldValue::from("2024-05-01T00:00:00Z"));

    let mut b = a.clone();
    b.insert("crawl_time".to_string(), FieldValue::from("2025-01-01T00:00:00Z"));

    // Same title and company, different crawl times
    let job_a = JobEntity::from_fields(a);
    let job_b = JobEntity::from_fields(b);
    assert_eq!(job_a.get_id().unwrap(), job_b.get_id().unwrap());
    assert_eq!(job_a.get_id().unwrap().len(), 64);

    // Content hashes ignore field order
    let mut forward = Fields::new();
    forward.insert("x".to_string(), FieldValue::from(1));
    forward.insert("y".to_string(), FieldValue::from("z"));
    let mut reverse = Fields::new();
    reverse.insert("y".to_string(), FieldValue::from("z"));
    reverse.insert("x".to_string(), FieldValue::from(1));

    assert_eq!(
        Record::from_fields(forward).get_id().unwrap(),
        Record::from_fields(reverse).get_id().unwrap()
    );
}

#[test]
fn test_sqlite_without_key_appends() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.db");
    let config = RecorderConfig::new(&path).with_primary_key(None);

    for _ in 0..2 {
        let mut rec = DataRecorder::new(config.clone()).unwrap();
        rec.add_data(vec![row("1", "one")], false).unwrap();
        rec.record(&[]).unwrap();
        rec.close().unwrap();
    }

    let table = read_sqlite(&path, "data");
    assert_eq!(table.rows.len(), 2);
}
