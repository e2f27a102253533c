//! Reconciliation of a new batch with rows already persisted in a file

use crate::entity::{content_hash, Fields};
use crate::recorder::traits::Table;
use std::collections::{HashMap, HashSet};

/// Merges `incoming` rows into `existing`
///
/// With a primary key, an incoming row whose key is already present replaces
/// the stored values in place (fields it does not carry are kept); rows with a
/// new key are appended. Without a primary key, incoming rows identical to a
/// stored row are dropped and the rest appended.
///
/// Existing columns keep their order; new columns are appended.
pub fn merge_tables(existing: Table, incoming: &Table, primary_key: Option<&str>) -> Table {
    let mut columns = existing.columns;
    for column in &incoming.columns {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }

    let mut rows = existing.rows;

    match primary_key {
        Some(key) => {
            let mut positions: HashMap<String, usize> = HashMap::new();
            for (index, row) in rows.iter().enumerate() {
                if let Some(value) = row.get(key).and_then(|v| v.as_key()) {
                    positions.entry(value).or_insert(index);
                }
            }

            for row in &incoming.rows {
                match row.get(key).and_then(|v| v.as_key()) {
                    Some(value) => match positions.get(&value) {
                        Some(&index) => overwrite(&mut rows[index], row),
                        None => {
                            positions.insert(value, rows.len());
                            rows.push(row.clone());
                        }
                    },
                    None => rows.push(row.clone()),
                }
            }
        }
        None => {
            let mut seen: HashSet<Option<String>> =
                rows.iter().map(|row| content_hash(row, &[])).collect();
            for row in &incoming.rows {
                if seen.insert(content_hash(row, &[])) {
                    rows.push(row.clone());
                }
            }
        }
    }

    Table { columns, rows }
}

fn overwrite(target: &mut Fields, source: &Fields) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}
