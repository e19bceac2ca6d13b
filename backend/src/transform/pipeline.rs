//! High-level pipeline API: daily report CSV to seven-day pivot records.
//!
//! Combines every stage: parsing, aggregation, grouping, the per-key pivot
//! (in parallel), validation and flattening.
//!
//! # Example
//!
//! ```rust,ignore
//! use casepivot::{run_file, PipelineConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let outcome = run_file(Path::new("us-counties.csv"), &PipelineConfig::default())?;
//!     println!("Pivoted {} keys", outcome.records.len());
//!     Ok(())
//! }
//! ```

use once_cell::sync::Lazy;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::aggregate::aggregate;
use super::flatten::flatten_all;
use super::grouper::group_by_key;
use super::pivot::{pivot_group, pivot_group_entry};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::config::{InvalidKeyPolicy, PipelineConfig};
use crate::error::{PipelineError, PipelineResult, PivotError, PivotResult};
use crate::models::{FlatRecord, KeyGroup, KeyGroupEntry, PivotRecord, RowError};
use crate::output::{write_records, OutputFormat};
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, ParseResult};
use crate::validation::{validate_against_source, validate_pivot_record};

/// How many individual problems of one kind get their own log line.
const LOG_SAMPLE: usize = 3;

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// One window per successfully pivoted key, ascending key order
    pub records: Vec<PivotRecord>,

    /// `records`, flattened
    pub flat: Vec<FlatRecord>,

    /// Keys that failed to pivot under [`InvalidKeyPolicy::Skip`]
    pub quarantined: Vec<PivotError>,

    /// Input rows that could not be typed
    pub row_errors: Vec<RowError>,

    /// Cells read as null in rows that were kept
    pub cell_warnings: Vec<RowError>,

    /// Records that failed a post-check (key, errors)
    pub validation_errors: Vec<(String, Vec<String>)>,

    /// Present when the run started from CSV
    pub csv_info: Option<CsvInfo>,

    /// Name of the key column in flat output
    pub key_column: String,
}

impl PipelineOutcome {
    /// Nothing skipped, nulled, quarantined or invalid.
    pub fn is_clean(&self) -> bool {
        self.row_errors.is_empty()
            && self.cell_warnings.is_empty()
            && self.quarantined.is_empty()
            && self.validation_errors.is_empty()
    }
}

/// Run the whole pipeline on a CSV file.
pub fn run_file(path: &Path, config: &PipelineConfig) -> PipelineResult<PipelineOutcome> {
    config.check()?;
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = parse_csv_file_auto(path, config.group_key)?;
    run_parsed(parsed, config)
}

/// Same as [`run_file`] for in-memory CSV bytes.
pub fn run_bytes(bytes: &[u8], config: &PipelineConfig) -> PipelineResult<PipelineOutcome> {
    config.check()?;
    log_info(format!("📖 Reading {} bytes...", bytes.len()));
    let parsed = parse_bytes_auto(bytes, config.group_key)?;
    run_parsed(parsed, config)
}

fn run_parsed(parsed: ParseResult, config: &PipelineConfig) -> PipelineResult<PipelineOutcome> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.rows_read()));

    let csv_info = CsvInfo {
        encoding: parsed.encoding,
        delimiter: parsed.delimiter,
        headers: parsed.headers,
        row_count: parsed.rows.len() + parsed.row_errors.len(),
    };

    if !parsed.row_errors.is_empty() {
        log_warning(format!("{} rows skipped", parsed.row_errors.len()));
        for err in parsed.row_errors.iter().take(LOG_SAMPLE) {
            log_info_indent(err.to_string(), 1);
        }
    }

    if !parsed.cell_warnings.is_empty() {
        log_warning(format!("{} cells read as null", parsed.cell_warnings.len()));
        for warning in parsed.cell_warnings.iter().take(LOG_SAMPLE) {
            log_info_indent(warning.to_string(), 1);
        }
    }

    if parsed.rows.is_empty() {
        return Err(PipelineError::EmptyInput(parsed.row_errors.len()));
    }

    log_info(format!("➕ Aggregating by {}...", config.key_column()));
    let observations = aggregate(&parsed.rows, config.group_key);
    log_success(format!("{} observations", observations.len()));

    log_info("📦 Grouping...");
    let groups = group_by_key(observations);
    log_success(format!("{} keys", groups.len()));

    let mut outcome = pivot_groups(groups, config)?;
    outcome.row_errors = parsed.row_errors;
    outcome.cell_warnings = parsed.cell_warnings;
    outcome.csv_info = Some(csv_info);
    Ok(outcome)
}

/// Pivot, validate and flatten already-grouped observations.
pub fn pivot_groups(groups: Vec<KeyGroup>, config: &PipelineConfig) -> PipelineResult<PipelineOutcome> {
    config.check()?;
    pivot_all(&groups, config, pivot_group, |group, record| {
        validate_against_source(record, &group.observations)
    })
}

/// Like [`pivot_groups`] for loosely typed input, where dates may be missing.
///
/// Groups are processed in ascending key order.
pub fn pivot_entry_groups(
    mut groups: Vec<KeyGroupEntry>,
    config: &PipelineConfig,
) -> PipelineResult<PipelineOutcome> {
    config.check()?;
    groups.sort_by(|a, b| a.key.cmp(&b.key));
    pivot_all(&groups, config, pivot_group_entry, |_, record| {
        validate_pivot_record(record)
    })
}

/// Pivot of one key plus the post-check result.
struct KeyOutput {
    record: PivotRecord,
    issues: Option<Vec<String>>,
}

fn pivot_all<G, P, V>(
    groups: &[G],
    config: &PipelineConfig,
    pivot_one: P,
    check_one: V,
) -> PipelineResult<PipelineOutcome>
where
    G: Sync,
    P: Fn(&G) -> PivotResult<PivotRecord> + Sync,
    V: Fn(&G, &PivotRecord) -> Result<(), Vec<String>> + Sync,
{
    log_info(format!(
        "🔄 Pivoting {} keys{}...",
        groups.len(),
        config
            .workers
            .map(|n| format!(" on {} workers", n))
            .unwrap_or_default()
    ));

    let validate = config.validate;
    // indexed collect keeps input order whatever the scheduling
    let results: Vec<PivotResult<KeyOutput>> = in_pool(config.workers, || {
        groups
            .par_iter()
            .map(|group| -> PivotResult<KeyOutput> {
                let record = pivot_one(group)?;
                let issues = if validate {
                    check_one(group, &record).err()
                } else {
                    None
                };
                Ok(KeyOutput { record, issues })
            })
            .collect()
    })?;

    let mut records = Vec::with_capacity(results.len());
    let mut quarantined = Vec::new();
    let mut validation_errors = Vec::new();

    for result in results {
        match result {
            Ok(KeyOutput { record, issues }) => {
                if let Some(errs) = issues {
                    validation_errors.push((record.key.clone(), errs));
                }
                records.push(record);
            }
            Err(err) => match config.invalid_key_policy {
                InvalidKeyPolicy::Fail => {
                    log_error(err.to_string());
                    return Err(err.into());
                }
                InvalidKeyPolicy::Skip => {
                    if quarantined.len() < LOG_SAMPLE {
                        log_warning(format!("Quarantined: {}", err));
                    }
                    quarantined.push(err);
                }
            },
        }
    }

    log_success(format!("{} windows built", records.len()));
    if !quarantined.is_empty() {
        log_warning(format!("{} keys quarantined", quarantined.len()));
    }

    if !validate {
        log_info("(validation skipped)");
    } else if validation_errors.is_empty() {
        log_success(format!("All {} windows valid!", records.len()));
    } else {
        log_error(format!("{} windows failed validation", validation_errors.len()));
        for (key, errs) in validation_errors.iter().take(LOG_SAMPLE) {
            log_info_indent(format!("{}: {}", key, errs.join(", ")), 1);
        }
    }

    let key_column = config.key_column().to_string();
    let flat = flatten_all(&records, &key_column);

    Ok(PipelineOutcome {
        records,
        flat,
        quarantined,
        row_errors: Vec::new(),
        cell_warnings: Vec::new(),
        validation_errors,
        csv_info: None,
        key_column,
    })
}

/// Write the flat records of a run in `format` to `path`, or stdout.
pub fn write_outcome(
    outcome: &PipelineOutcome,
    format: OutputFormat,
    path: Option<&Path>,
) -> PipelineResult<()> {
    write_records(&outcome.flat, &outcome.key_column, format, path)?;
    Ok(())
}

/// Dedicated pools by thread count, built on first use and kept for the
/// life of the process.
static WORKER_POOLS: Lazy<Mutex<HashMap<usize, Arc<ThreadPool>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Shared pool of `workers` threads.
fn worker_pool(workers: usize) -> PipelineResult<Arc<ThreadPool>> {
    let mut pools = WORKER_POOLS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(pool) = pools.get(&workers) {
        return Ok(Arc::clone(pool));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("casepivot-worker-{}", idx))
        .build()
        .map_err(|e| PipelineError::Config(format!("worker pool: {}", e)))?;
    let pool = Arc::new(pool);
    pools.insert(workers, Arc::clone(&pool));
    Ok(pool)
}

/// Run `op` on rayon's global pool, or on the shared pool of `workers`
/// threads.
fn in_pool<T, F>(workers: Option<usize>, op: F) -> PipelineResult<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match workers {
        None => Ok(op()),
        Some(n) => Ok(worker_pool(n)?.install(op)),
    }
}

/// Format delimiter for display
pub fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupKey;
    use crate::models::{Observation, ObservationEntry, WINDOW_DAYS};
    use chrono::{Duration, NaiveDate};

    const CSV: &str = "\
date,county,state,fips,cases,deaths
2020-03-02,Franklin,Ohio,39049,4,0
2020-03-01,Franklin,Ohio,39049,1,0
2020-03-01,Summit,Ohio,39153,2,
2020-03-01,Salt Lake,Utah,49035,3,1
";

    fn quiet_config() -> PipelineConfig {
        crate::api::logs::set_quiet(true);
        PipelineConfig::default()
    }

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, 1).unwrap() + Duration::days(offset)
    }

    fn groups(n_keys: usize, n_days: i64) -> Vec<KeyGroup> {
        (0..n_keys)
            .map(|k| KeyGroup {
                key: format!("key-{:03}", k),
                observations: (0..n_days)
                    .map(|d| Observation::new(day(d), Some(d * k as i64), Some(0)))
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn test_run_bytes_by_state() {
        let outcome = run_bytes(CSV.as_bytes(), &quiet_config()).unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].key, "Ohio");
        assert_eq!(outcome.records[1].key, "Utah");
        assert!(outcome.is_clean());

        // Ohio: 03-01 summed across counties, padded, then 03-02
        let ohio = &outcome.records[0];
        let first = Observation::new(day(0), Some(3), Some(0));
        assert_eq!(ohio.slots[..6], [first; 6]);
        assert_eq!(ohio.slots[6], Observation::new(day(1), Some(4), Some(0)));

        assert_eq!(outcome.flat.len(), 2);
        assert_eq!(outcome.key_column, "state");
        let info = outcome.csv_info.unwrap();
        assert_eq!(info.delimiter, ',');
        assert_eq!(info.row_count, 4);
    }

    #[test]
    fn test_run_bytes_by_county() {
        let config = PipelineConfig {
            group_key: GroupKey::County,
            ..quiet_config()
        };
        let outcome = run_bytes(CSV.as_bytes(), &config).unwrap();

        let keys: Vec<&str> = outcome.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["Ohio/Franklin", "Ohio/Summit", "Utah/Salt Lake"]);
        assert_eq!(outcome.records[1].slots[0].deaths, None);
        assert_eq!(outcome.flat[0].key_column, "county");
    }

    #[test]
    fn test_bad_rows_reported() {
        let csv = format!("{}not-a-date,Franklin,Ohio,39049,1,0\n", CSV);
        let outcome = run_bytes(csv.as_bytes(), &quiet_config()).unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.row_errors.len(), 1);
        assert!(!outcome.is_clean());
    }

    #[test]
    fn test_bad_cells_still_count_toward_totals() {
        let csv = "\
date,county,state,fips,cases,deaths
2020-03-01,Franklin,Ohio,39049,4,1
2020-03-01,Summit,Ohio,39153,n/a,5
2020-03-01,New York City,Ohio,NYC,2,2
";
        let outcome = run_bytes(csv.as_bytes(), &quiet_config()).unwrap();

        assert!(outcome.row_errors.is_empty());
        assert_eq!(outcome.cell_warnings.len(), 2);
        assert!(!outcome.is_clean());
        assert_eq!(
            outcome.records[0].slots[6],
            Observation::new(day(0), Some(6), Some(8))
        );
    }

    #[test]
    fn test_bad_fips_dropped_when_keyed_on_fips() {
        let csv = "date,state,fips,cases,deaths\n2020-03-01,Ohio,NYC,2,2\n2020-03-01,Ohio,39049,1,0\n";
        let config = PipelineConfig {
            group_key: GroupKey::Fips,
            ..quiet_config()
        };
        let outcome = run_bytes(csv.as_bytes(), &config).unwrap();

        assert_eq!(outcome.row_errors.len(), 1);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].key, "39049");
    }

    #[test]
    fn test_worker_pool_is_reused() {
        let first = worker_pool(3).unwrap();
        let second = worker_pool(3).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.current_num_threads(), 3);
        assert!(!Arc::ptr_eq(&first, &worker_pool(2).unwrap()));
    }

    #[test]
    fn test_write_outcome_wraps_output_errors() {
        let outcome = run_bytes(CSV.as_bytes(), &quiet_config()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("out.csv");
        write_outcome(&outcome, OutputFormat::Csv, Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);

        let missing = dir.path().join("no-such-dir").join("out.csv");
        let err = write_outcome(&outcome, OutputFormat::Csv, Some(&missing)).unwrap_err();
        assert!(matches!(err, PipelineError::Output(_)));
    }

    #[test]
    fn test_header_only_is_empty_input() {
        let err = run_bytes(b"date,state,cases,deaths\n", &quiet_config()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput(0)));
    }

    #[test]
    fn test_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily.csv");
        std::fs::write(&path, CSV).unwrap();

        let outcome = run_file(&path, &quiet_config()).unwrap();
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_output_independent_of_worker_count() {
        let input = groups(40, 10);
        let base = pivot_groups(input.clone(), &quiet_config()).unwrap();

        for workers in [1, 3, 8] {
            let config = PipelineConfig {
                workers: Some(workers),
                ..quiet_config()
            };
            let outcome = pivot_groups(input.clone(), &config).unwrap();
            assert_eq!(outcome.records, base.records, "workers={workers}");
        }

        let keys: Vec<&str> = base.records.iter().map(|r| r.key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(base.records.iter().all(|r| r.slots[0].date == day(3)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PipelineConfig {
            workers: Some(0),
            ..quiet_config()
        };
        assert!(matches!(
            pivot_groups(groups(1, 1), &config),
            Err(PipelineError::Config(_))
        ));
    }

    fn entry_groups() -> Vec<KeyGroupEntry> {
        let dated = |d: i64| ObservationEntry::from(Observation::new(day(d), Some(1), Some(0)));
        vec![
            KeyGroupEntry {
                key: "Utah".into(),
                observations: vec![dated(0), dated(1)],
            },
            KeyGroupEntry {
                key: "Ohio".into(),
                observations: vec![
                    dated(0),
                    ObservationEntry {
                        date: None,
                        cases: Some(1),
                        deaths: None,
                    },
                ],
            },
            KeyGroupEntry {
                key: "Iowa".into(),
                observations: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_fail_policy_stops_at_first_key() {
        let err = pivot_entry_groups(entry_groups(), &quiet_config()).unwrap_err();
        match err {
            PipelineError::Pivot(pivot_err) => {
                assert_eq!(pivot_err.key(), "Iowa");
                assert!(pivot_err.is_invalid_input());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_skip_policy_quarantines() {
        let config = PipelineConfig {
            invalid_key_policy: InvalidKeyPolicy::Skip,
            ..quiet_config()
        };
        let outcome = pivot_entry_groups(entry_groups(), &config).unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].key, "Utah");
        assert_eq!(outcome.flat.len(), 1);

        let quarantined: Vec<&str> = outcome.quarantined.iter().map(|e| e.key()).collect();
        assert_eq!(quarantined, vec!["Iowa", "Ohio"]);
        assert!(matches!(
            outcome.quarantined[1],
            PivotError::MissingDate { index: 1, .. }
        ));
    }

    #[test]
    fn test_validation_flags_negative_counts() {
        let input = vec![KeyGroup {
            key: "Ohio".into(),
            observations: vec![Observation::new(day(0), Some(-1), Some(0))],
        }];

        let outcome = pivot_groups(input.clone(), &quiet_config()).unwrap();
        assert_eq!(outcome.validation_errors.len(), 1);
        assert_eq!(outcome.validation_errors[0].1.len(), WINDOW_DAYS);

        let config = PipelineConfig {
            validate: false,
            ..quiet_config()
        };
        let outcome = pivot_groups(input, &config).unwrap();
        assert!(outcome.validation_errors.is_empty());
        assert_eq!(outcome.records.len(), 1);
    }
}
