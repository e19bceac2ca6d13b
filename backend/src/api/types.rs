//! JSON bodies returned by the HTTP API.
//!
//! `records` carries the flattened windows exactly as the JSON writer
//! emits them.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::FlatRecord;
use crate::transform::pipeline::PipelineOutcome;

/// Response body for a successful CSV upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning", "error"
    pub status: String,

    /// One flat record per key
    pub records: Vec<FlatRecord>,

    pub metadata: ResponseMetadata,
}

/// Metadata about the run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Keys with a record
    pub total_keys: usize,

    pub key_column: String,

    pub csv_info: Option<CsvMetadata>,

    /// Input rows that could not be parsed
    pub row_errors: Vec<RowErrorInfo>,

    /// Cells read as null in rows that were kept
    pub cell_warnings: Vec<RowErrorInfo>,

    /// Keys that failed to pivot
    pub quarantined: Vec<QuarantinedKey>,

    pub validation: ValidationStats,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowErrorInfo {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantinedKey {
    pub key: String,
    pub error: String,
}

/// Validation statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<ValidationError>,
}

/// A validation error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub key: String,
    pub errors: Vec<String>,
}

impl From<PipelineOutcome> for PivotResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        let status = if outcome.is_clean() { "ready" } else { "warning" };
        let total = outcome.records.len();
        let invalid = outcome.validation_errors.len();

        PivotResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            records: outcome.flat,
            metadata: ResponseMetadata {
                total_keys: total,
                key_column: outcome.key_column,
                csv_info: outcome.csv_info.map(|info| CsvMetadata {
                    encoding: info.encoding,
                    delimiter: info.delimiter.to_string(),
                    row_count: info.row_count,
                    columns: info.headers,
                }),
                row_errors: outcome
                    .row_errors
                    .into_iter()
                    .map(|e| RowErrorInfo {
                        line: e.line,
                        message: e.message,
                    })
                    .collect(),
                cell_warnings: outcome
                    .cell_warnings
                    .into_iter()
                    .map(|e| RowErrorInfo {
                        line: e.line,
                        message: e.message,
                    })
                    .collect(),
                quarantined: outcome
                    .quarantined
                    .into_iter()
                    .map(|e| QuarantinedKey {
                        key: e.key().to_string(),
                        error: e.to_string(),
                    })
                    .collect(),
                validation: ValidationStats {
                    valid: total - invalid,
                    invalid,
                    errors: outcome
                        .validation_errors
                        .into_iter()
                        .map(|(key, errors)| ValidationError { key, errors })
                        .collect(),
                },
            },
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "records": [],
        "metadata": {
            "totalKeys": 0
        }
    })
}
