//! Error types for the casepivot pipeline.
//!
//! One enum per stage, joined at the top by [`PipelineError`]:
//!
//! - [`CsvError`] - reading and decoding the input table
//! - [`PivotError`] - per-key window selection (the `InvalidInput` class)
//! - [`OutputError`] - writing flattened records
//! - [`PipelineError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP layer
//!
//! `From` implementations let `?` cross stage boundaries.

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while reading the input table.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid CSV format.
    #[error("Invalid CSV format: {0}")]
    ParseError(String),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// A column the run depends on is absent from the header.
    #[error("Missing required column: `{0}`")]
    MissingColumn(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        CsvError::ParseError(err.to_string())
    }
}

// =============================================================================
// Pivot Errors
// =============================================================================

/// Invalid input handed to the window pivot for a single key.
///
/// Both variants are fatal for that key only; whether the run continues is
/// decided by the pipeline's [`crate::config::InvalidKeyPolicy`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PivotError {
    /// The key arrived with no observations at all.
    #[error("Invalid input for key '{key}': observation list is empty")]
    EmptyObservations { key: String },

    /// An observation for the key carries no date.
    #[error("Invalid input for key '{key}': observation #{index} has no date")]
    MissingDate { key: String, index: usize },
}

impl PivotError {
    /// Key the failure belongs to.
    pub fn key(&self) -> &str {
        match self {
            PivotError::EmptyObservations { key } | PivotError::MissingDate { key, .. } => key,
        }
    }

    /// Every pivot failure is an `InvalidInput` failure.
    pub fn is_invalid_input(&self) -> bool {
        true
    }
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing flattened records.
#[derive(Debug, Error)]
pub enum OutputError {
    /// IO error.
    #[error("Output IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV writer error.
    #[error("Output CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// JSON error.
    #[error("Output JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run_file`]
/// and friends. It wraps all lower-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// A key failed to pivot under the `fail` policy.
    #[error("Pivot error: {0}")]
    Pivot(#[from] PivotError),

    /// Output error.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// JSON input could not be read.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable rows.
    #[error("No usable rows in input ({0} rows rejected)")]
    EmptyInput(usize),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for the window pivot.
pub type PivotResult<T> = Result<T, PivotError>;

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
