//! Last-seven-days window pivot.
//!
//! Given every observation of one key, in any order, produce exactly
//! [`WINDOW_DAYS`] chronologically ordered slots:
//!
//! - seven or more observations: the seven most recent dates, oldest first;
//! - fewer: the earliest observation is repeated in the leading slots, and
//!   every real observation follows in date order.
//!
//! ```text
//! n = 2:  [03-01, 03-01, 03-01, 03-01, 03-01, 03-01, 03-02]
//!          └──────────── padding ──────────┘  └── real ──┘
//! ```
//!
//! Sorting is stable, so observations sharing a date keep their input order.
//! Counts are copied verbatim; nulls stay null. Pure: safe to call from any
//! number of threads at once.

use crate::error::{PivotError, PivotResult};
use crate::models::{KeyGroup, KeyGroupEntry, Observation, ObservationEntry, PivotRecord, WINDOW_DAYS};

/// Pivot one key's observations into its seven-slot window.
///
/// Fails with [`PivotError::EmptyObservations`] when `observations` is empty.
pub fn pivot(key: &str, observations: &[Observation]) -> PivotResult<PivotRecord> {
    let mut sorted = observations.to_vec();
    sorted.sort_by_key(|obs| obs.date);

    let Some(&earliest) = sorted.first() else {
        return Err(PivotError::EmptyObservations {
            key: key.to_string(),
        });
    };

    let recent = &sorted[sorted.len().saturating_sub(WINDOW_DAYS)..];
    let padding = WINDOW_DAYS - recent.len();

    let slots = std::array::from_fn(|idx| {
        if idx < padding {
            earliest
        } else {
            recent[idx - padding]
        }
    });

    Ok(PivotRecord {
        key: key.to_string(),
        slots,
    })
}

/// Pivot loosely typed entries, rejecting any entry without a date.
///
/// The first undated entry (by position) is reported as
/// [`PivotError::MissingDate`].
pub fn pivot_entries(key: &str, entries: &[ObservationEntry]) -> PivotResult<PivotRecord> {
    let observations = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            entry.to_observation().ok_or_else(|| PivotError::MissingDate {
                key: key.to_string(),
                index,
            })
        })
        .collect::<PivotResult<Vec<_>>>()?;

    pivot(key, &observations)
}

/// [`pivot`] over a [`KeyGroup`].
pub fn pivot_group(group: &KeyGroup) -> PivotResult<PivotRecord> {
    pivot(&group.key, &group.observations)
}

/// [`pivot_entries`] over a [`KeyGroupEntry`].
pub fn pivot_group_entry(group: &KeyGroupEntry) -> PivotResult<PivotRecord> {
    pivot_entries(&group.key, &group.observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, 1).unwrap() + Duration::days(offset)
    }

    fn obs(offset: i64, cases: i64, deaths: i64) -> Observation {
        Observation::new(day(offset), Some(cases), Some(deaths))
    }

    /// `n` consecutive days starting 2020-03-01, counts increasing.
    fn series(n: i64) -> Vec<Observation> {
        (0..n).map(|i| obs(i, 10 * (i + 1), i)).collect()
    }

    fn dates(record: &PivotRecord) -> Vec<NaiveDate> {
        record.slots.iter().map(|s| s.date).collect()
    }

    #[test]
    fn test_single_observation_fills_every_slot() {
        let only = obs(0, 5, 0);
        let record = pivot("Ohio", &[only]).unwrap();

        assert_eq!(record.key, "Ohio");
        assert_eq!(record.slots, [only; WINDOW_DAYS]);
    }

    #[test]
    fn test_two_observations_pad_with_earliest() {
        let first = obs(0, 5, 0);
        let second = obs(1, 7, 1);
        let record = pivot("Ohio", &[second, first]).unwrap();

        assert_eq!(
            record.slots,
            [first, first, first, first, first, first, second]
        );
    }

    #[test]
    fn test_exactly_seven_is_unchanged() {
        let input = series(7);
        let mut shuffled = input.clone();
        shuffled.reverse();
        shuffled.swap(1, 4);

        let record = pivot("Ohio", &shuffled).unwrap();
        assert_eq!(record.slots.to_vec(), input);
    }

    #[test]
    fn test_ten_keeps_most_recent_seven() {
        let input = series(10);
        let record = pivot("Ohio", &input).unwrap();

        assert_eq!(record.slots.to_vec(), input[3..].to_vec());
        assert_eq!(record.slot(1).unwrap().date, day(3));
        assert_eq!(record.slot(7).unwrap().date, day(9));
    }

    #[test]
    fn test_null_counts_pass_through() {
        let mut input = series(7);
        input[6].cases = None;
        input[2].deaths = None;

        let record = pivot("Ohio", &input).unwrap();
        assert_eq!(record.slot(7).unwrap().cases, None);
        assert_eq!(record.slot(3).unwrap().deaths, None);
        assert_eq!(record.slot(6).unwrap().cases, Some(60));
    }

    #[test]
    fn test_empty_is_invalid_input() {
        let err = pivot("Ohio", &[]).unwrap_err();
        assert_eq!(err, PivotError::EmptyObservations { key: "Ohio".into() });
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_missing_date_is_invalid_input() {
        let entries = vec![
            ObservationEntry::from(obs(0, 1, 0)),
            ObservationEntry {
                date: None,
                cases: Some(2),
                deaths: Some(0),
            },
        ];
        let err = pivot_entries("Ohio", &entries).unwrap_err();
        assert_eq!(
            err,
            PivotError::MissingDate {
                key: "Ohio".into(),
                index: 1
            }
        );
    }

    #[test]
    fn test_entries_match_typed_pivot() {
        let input = series(4);
        let entries: Vec<ObservationEntry> = input.iter().copied().map(Into::into).collect();
        assert_eq!(
            pivot_entries("Ohio", &entries).unwrap(),
            pivot("Ohio", &input).unwrap()
        );
        assert!(matches!(
            pivot_entries("Ohio", &[]),
            Err(PivotError::EmptyObservations { .. })
        ));
    }

    #[test]
    fn test_equal_dates_keep_input_order() {
        let a = obs(0, 1, 0);
        let b = obs(0, 2, 0);
        let record = pivot("Ohio", &[obs(1, 9, 0), a, b]).unwrap();

        // padding repeats the first of the tied observations
        assert_eq!(record.slots[..4], [a, a, a, a]);
        assert_eq!(record.slots[4..], [a, b, obs(1, 9, 0)]);
    }

    #[test]
    fn test_window_invariants_across_lengths() {
        for n in 1..=20 {
            let mut input = series(n);
            input.reverse();
            let record = pivot("Ohio", &input).unwrap();
            let got = dates(&record);

            // determinism
            assert_eq!(pivot("Ohio", &input).unwrap(), record);

            // monotonic
            assert!(got.windows(2).all(|w| w[0] <= w[1]), "n={n}");

            // every slot copies a real observation
            assert!(record.slots.iter().all(|s| input.contains(s)), "n={n}");

            let mut sorted = input.clone();
            sorted.sort_by_key(|o| o.date);
            if n >= WINDOW_DAYS as i64 {
                let expected: Vec<NaiveDate> = sorted[sorted.len() - WINDOW_DAYS..]
                    .iter()
                    .map(|o| o.date)
                    .collect();
                assert_eq!(got, expected, "n={n}");
            } else {
                let pad = WINDOW_DAYS - n as usize;
                assert!(record.slots[..pad].iter().all(|s| *s == sorted[0]), "n={n}");
                assert_eq!(record.slots[pad..].to_vec(), sorted, "n={n}");
            }
        }
    }

    #[test]
    fn test_pivot_group_wrappers() {
        let group = KeyGroup {
            key: "Iowa".into(),
            observations: series(3),
        };
        let record = pivot_group(&group).unwrap();
        assert_eq!(record.key, "Iowa");
        assert_eq!(pivot_group_entry(&KeyGroupEntry::from(group)).unwrap(), record);
    }
}
