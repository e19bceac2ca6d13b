//! # casepivot - seven-day windows over daily case/death reports
//!
//! casepivot reads a daily, per-region report table and produces one
//! fixed-width record per region holding its seven most recent days.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐   ┌───────────┐
//! │  CSV File   │──▶│  Parser   │──▶│ Aggregate │──▶│  Pivot  │──▶│ Flat CSV/ │
//! │ (ISO/UTF8)  │   │ (auto-enc)│   │  + Group  │   │ (rayon) │   │   JSON    │
//! └─────────────┘   └───────────┘   └───────────┘   └─────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use casepivot::{run_file, write_records, OutputFormat, PipelineConfig};
//! use std::path::Path;
//!
//! let outcome = run_file(Path::new("us-states.csv"), &PipelineConfig::default())?;
//! write_records(&outcome.flat, &outcome.key_column, OutputFormat::Csv, None)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, observations, windows, flat records
//! - [`config`] - Pipeline configuration and environment
//! - [`parser`] - CSV parsing with auto-detection
//! - [`transform`] - Aggregation, grouping, the pivot, and the pipeline
//! - [`validation`] - Window post-checks
//! - [`output`] - CSV and JSON writers
//! - [`api`] - HTTP API server and logging

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Output
pub mod output;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, CsvResult, OutputError, OutputResult, PipelineError, PipelineResult, PivotError,
    PivotResult, ServerError, ServerResult,
};

// =============================================================================
// Re-exports - Models & config
// =============================================================================

pub use models::{
    FlatRecord, FlatValue, KeyGroup, KeyGroupEntry, KeyedObservation, Observation,
    ObservationEntry, PivotRecord, RawRow, RowError, WINDOW_DAYS,
};

pub use config::{GroupKey, InvalidKeyPolicy, PipelineConfig, DEFAULT_PORT};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    parse_str, ParseResult,
};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    aggregate, flat_headers, flatten, flatten_all, group_by_key, pivot, pivot_entries,
    pivot_group, pivot_group_entry,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    pivot_entry_groups, pivot_groups, run_bytes, run_file, write_outcome, CsvInfo,
    PipelineOutcome,
};

// =============================================================================
// Re-exports - Validation & output
// =============================================================================

pub use validation::{is_valid_pivot_record, validate_against_source, validate_pivot_record};

pub use output::{write_csv, write_json, write_json_value, write_records, OutputFormat};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::logs::{log_error, log_info, log_info_indent, log_success, log_warning, set_quiet};

pub use api::types::{error_response, PivotResponse, ResponseMetadata};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
