//! Rename a [`PivotRecord`] into flat output columns.
//!
//! `slot_i.{date,cases,deaths}` becomes `day_{i}_{date,cases,deaths}`, with
//! the key column in front. No values change.

use crate::models::{FlatRecord, FlatValue, PivotRecord, WINDOW_DAYS};

const FIELDS: [&str; 3] = ["date", "cases", "deaths"];

/// Output column names, key column first (22 in total).
pub fn flat_headers(key_column: &str) -> Vec<String> {
    std::iter::once(key_column.to_string())
        .chain(day_columns())
        .collect()
}

/// Flatten one pivot record.
pub fn flatten(record: &PivotRecord, key_column: &str) -> FlatRecord {
    let values = record.slots.iter().flat_map(|slot| {
        [
            FlatValue::Date(slot.date),
            FlatValue::Count(slot.cases),
            FlatValue::Count(slot.deaths),
        ]
    });

    FlatRecord {
        key_column: key_column.to_string(),
        key: record.key.clone(),
        columns: day_columns().zip(values).collect(),
    }
}

/// Flatten many records.
pub fn flatten_all(records: &[PivotRecord], key_column: &str) -> Vec<FlatRecord> {
    records.iter().map(|r| flatten(r, key_column)).collect()
}

fn day_columns() -> impl Iterator<Item = String> {
    (1..=WINDOW_DAYS).flat_map(|day| FIELDS.iter().map(move |field| format!("day_{day}_{field}")))
}
