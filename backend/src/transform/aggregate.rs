//! Observation aggregation: one observation per (key, date).
//!
//! ```text
//! Raw rows (one per county)             →  Observations (one per key/date)
//! ┌──────────────────────────────────┐     ┌──────────────────────────────┐
//! │ 2020-03-01  Washington  King  5  │     │ Washington  2020-03-01  7    │
//! │ 2020-03-01  Washington  Pierce 2 │  →  ├──────────────────────────────┤
//! │ 2020-03-02  Washington  King  9  │     │ Washington  2020-03-02  9    │
//! └──────────────────────────────────┘     └──────────────────────────────┘
//! ```
//!
//! Counts are summed with SQL `SUM` semantics: nulls are ignored, and a sum
//! over nothing but nulls stays null.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::config::GroupKey;
use crate::models::{KeyedObservation, Observation, RawRow};

/// Sum duplicate (key, date) rows into single observations.
///
/// Output is ordered by key, then date. Rows without a value for the key
/// column are left out.
pub fn aggregate(rows: &[RawRow], group_key: GroupKey) -> Vec<KeyedObservation> {
    let mut totals: BTreeMap<(String, NaiveDate), (Option<i64>, Option<i64>)> = BTreeMap::new();

    for row in rows {
        let Some(key) = group_key.key_for(row) else {
            continue;
        };
        let entry = totals.entry((key, row.date)).or_insert((None, None));
        entry.0 = add_nullable(entry.0, row.cases);
        entry.1 = add_nullable(entry.1, row.deaths);
    }

    totals
        .into_iter()
        .map(|((key, date), (cases, deaths))| KeyedObservation {
            key,
            observation: Observation::new(date, cases, deaths),
        })
        .collect()
}

/// Null-aware addition.
pub fn add_nullable(acc: Option<i64>, value: Option<i64>) -> Option<i64> {
    match (acc, value) {
        (Some(a), Some(b)) => Some(a.saturating_add(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
