//! Post-checks for emitted pivot windows.
//!
//! These never change a record; they report what is wrong with it so the
//! pipeline can log and count it.
//!
//! - [`validate_pivot_record`] - structural checks on the window alone
//! - [`validate_against_source`] - the window against the observations it
//!   was built from
//!
//! # Example
//!
//! ```rust,ignore
//! use casepivot::{pivot, validate_against_source};
//!
//! let record = pivot("Ohio", &observations)?;
//! assert!(validate_against_source(&record, &observations).is_ok());
//! ```

use crate::models::{Observation, PivotRecord, WINDOW_DAYS};

/// Check slot dates are non-decreasing and counts are non-negative.
pub fn validate_pivot_record(record: &PivotRecord) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for (idx, pair) in record.slots.windows(2).enumerate() {
        if pair[0].date > pair[1].date {
            errors.push(format!(
                "day_{} date {} is after day_{} date {}",
                idx + 1,
                pair[0].date,
                idx + 2,
                pair[1].date
            ));
        }
    }

    for (idx, slot) in record.slots.iter().enumerate() {
        if slot.cases.is_some_and(|n| n < 0) {
            errors.push(format!("day_{}_cases is negative", idx + 1));
        }
        if slot.deaths.is_some_and(|n| n < 0) {
            errors.push(format!("day_{}_deaths is negative", idx + 1));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check with [`validate_pivot_record`].
pub fn is_valid_pivot_record(record: &PivotRecord) -> bool {
    validate_pivot_record(record).is_ok()
}

/// Structural checks plus: every slot is an exact copy of a source
/// observation, and with seven or more sources the window holds the seven
/// latest dates.
pub fn validate_against_source(
    record: &PivotRecord,
    source: &[Observation],
) -> Result<(), Vec<String>> {
    let mut errors = validate_pivot_record(record).err().unwrap_or_default();

    for (idx, slot) in record.slots.iter().enumerate() {
        if !source.contains(slot) {
            errors.push(format!(
                "day_{} ({}) does not match any source observation",
                idx + 1,
                slot.date
            ));
        }
    }

    if source.len() >= WINDOW_DAYS {
        let mut latest: Vec<_> = source.iter().map(|o| o.date).collect();
        latest.sort_unstable();
        let latest = &latest[latest.len() - WINDOW_DAYS..];
        let window: Vec<_> = record.slots.iter().map(|o| o.date).collect();
        if window != latest {
            errors.push("window does not hold the seven most recent dates".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
