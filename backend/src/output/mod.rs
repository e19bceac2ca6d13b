//! Writers for flattened records.
//!
//! - CSV: header row from [`flat_headers`], ISO dates, empty cell for null
//! - JSON: array of objects, keys in column order, `null` for null

use clap::ValueEnum;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::OutputResult;
use crate::models::FlatRecord;
use crate::transform::flatten::flat_headers;

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Write records as CSV, header first. The header is written even when
/// `records` is empty.
pub fn write_csv<W: Write>(records: &[FlatRecord], key_column: &str, writer: W) -> OutputResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(flat_headers(key_column))?;
    for record in records {
        csv_writer.write_record(record.to_csv_row())?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write records as a pretty-printed JSON array.
pub fn write_json<W: Write>(records: &[FlatRecord], mut writer: W) -> OutputResult<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writeln!(writer)?;
    Ok(())
}

/// Write records in `format` to `path`, or stdout when `path` is `None`.
pub fn write_records(
    records: &[FlatRecord],
    key_column: &str,
    format: OutputFormat,
    path: Option<&Path>,
) -> OutputResult<()> {
    match path {
        Some(p) => write_to(records, key_column, format, BufWriter::new(File::create(p)?)),
        None => write_to(records, key_column, format, io::stdout().lock()),
    }
}

/// Pretty JSON of any serializable value to `path`, or stdout.
pub fn write_json_value<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> OutputResult<()> {
    match path {
        Some(p) => {
            let mut writer = BufWriter::new(File::create(p)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, value)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn write_to<W: Write>(
    records: &[FlatRecord],
    key_column: &str,
    format: OutputFormat,
    mut writer: W,
) -> OutputResult<()> {
    match format {
        OutputFormat::Csv => write_csv(records, key_column, &mut writer)?,
        OutputFormat::Json => write_json(records, &mut writer)?,
    }
    writer.flush()?;
    Ok(())
}
