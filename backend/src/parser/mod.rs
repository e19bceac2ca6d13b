//! CSV reader for daily case/death reports, with encoding and delimiter
//! auto-detection.
//!
//! Turns raw bytes into typed [`RawRow`]s. A row without a readable date or
//! key is reported as a [`RowError`] and skipped. An unreadable count (or a
//! `fips` cell the grouping does not key on) becomes null and is reported as
//! a cell warning; the row is kept. Only file-level problems (empty input,
//! missing columns) abort the parse.

use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;

use crate::config::GroupKey;
use crate::error::{CsvError, CsvResult};
use crate::models::{RawRow, RowError};

/// Columns every input must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["date", "state", "cases", "deaths"];

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Successfully typed rows
    pub rows: Vec<RawRow>,
    /// Rows that were skipped, with the reason
    pub row_errors: Vec<RowError>,
    /// Cells that were read as null in rows that were kept
    pub cell_warnings: Vec<RowError>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers as found in the file
    pub headers: Vec<String>,
}

impl ParseResult {
    /// Number of data rows read, typed or not.
    pub fn rows_read(&self) -> usize {
        self.rows.len() + self.row_errors.len()
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "utf-8".to_string();
    }

    let charset = chardet::detect(bytes).0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding.
///
/// Unknown labels fall back to lossy UTF-8. A leading BOM is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let codec = encoding_rs::Encoding::for_label(encoding.trim().as_bytes())
        .unwrap_or(encoding_rs::UTF_8);
    let (decoded, _, _) = codec.decode(bytes);
    decoded.into_owned()
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P, group_key: GroupKey) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes, group_key)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8], group_key: GroupKey) -> CsvResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    parse_str(&content, delimiter, encoding, group_key)
}

/// Parse already-decoded CSV text with an explicit delimiter.
pub fn parse_str(
    content: &str,
    delimiter: char,
    encoding: String,
    group_key: GroupKey,
) -> CsvResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let delimiter_byte = u8::try_from(delimiter)
        .map_err(|_| CsvError::ParseError(format!("Unsupported delimiter '{}'", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let header_record = reader.headers()?.clone();
    let headers: Vec<String> = header_record
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let columns = ColumnMap::resolve(&header_record, group_key)?;

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut cell_warnings = Vec::new();
    let mut warnings = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header, lines are 1-based
        let fallback_line = idx + 2;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {}", e),
                });
                continue;
            }
        };

        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        match columns.parse_row(&record, group_key, &mut warnings) {
            Ok(row) => {
                rows.push(row);
                cell_warnings.extend(warnings.drain(..).map(|message| RowError { line, message }));
            }
            Err(message) => {
                warnings.clear();
                row_errors.push(RowError { line, message });
            }
        }
    }

    Ok(ParseResult {
        rows,
        row_errors,
        cell_warnings,
        encoding,
        delimiter,
        headers,
    })
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone)]
struct ColumnMap {
    date: usize,
    state: usize,
    cases: usize,
    deaths: usize,
    county: Option<usize>,
    fips: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord, group_key: GroupKey) -> CsvResult<Self> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (normalize_header_name(name), idx))
            .collect();

        let required = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| CsvError::MissingColumn(name.to_string()))
        };

        let county = index.get("county").copied();
        let fips = index.get("fips").or_else(|| index.get("fip")).copied();

        match group_key {
            GroupKey::County if county.is_none() => {
                return Err(CsvError::MissingColumn("county".to_string()))
            }
            GroupKey::Fips if fips.is_none() => {
                return Err(CsvError::MissingColumn("fips".to_string()))
            }
            _ => {}
        }

        Ok(Self {
            date: required(REQUIRED_COLUMNS[0])?,
            state: required(REQUIRED_COLUMNS[1])?,
            cases: required(REQUIRED_COLUMNS[2])?,
            deaths: required(REQUIRED_COLUMNS[3])?,
            county,
            fips,
        })
    }

    /// Hard failures (date, state, the chosen key) reject the row; bad
    /// optional cells are nulled and described in `warnings`.
    fn parse_row(
        &self,
        record: &StringRecord,
        group_key: GroupKey,
        warnings: &mut Vec<String>,
    ) -> Result<RawRow, String> {
        let date = parse_date(field(record, self.date).ok_or("Missing required value: `date`")?)?;
        let state = field(record, self.state)
            .ok_or("Missing required value: `state`")?
            .to_string();
        let county = self.county.and_then(|idx| field(record, idx)).map(str::to_string);
        let fips = match (group_key, self.fips) {
            (GroupKey::Fips, Some(idx)) => parse_count(field(record, idx), "fips")?,
            (_, idx) => nullable_count(record, idx, "fips", warnings),
        };
        let cases = nullable_count(record, Some(self.cases), "cases", warnings);
        let deaths = nullable_count(record, Some(self.deaths), "deaths", warnings);

        match group_key {
            GroupKey::County if county.is_none() => {
                return Err("Missing value for key column `county`".to_string())
            }
            GroupKey::Fips if fips.is_none() => {
                return Err("Missing value for key column `fips`".to_string())
            }
            _ => {}
        }

        Ok(RawRow {
            date,
            county,
            state,
            fips,
            cases,
            deaths,
        })
    }
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn field(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
    FMTS.iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| format!("Invalid date '{}'. Expected YYYY-MM-DD.", s))
}

/// Empty cell is null; anything else must be an integer, optionally with an
/// all-zero fraction ("12.0"). No exponents.
fn parse_count(s: Option<&str>, column: &str) -> Result<Option<i64>, String> {
    let Some(s) = s else { return Ok(None) };
    let digits = match s.split_once('.') {
        Some((whole, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => whole,
        _ => s,
    };
    digits
        .parse::<i64>()
        .map(Some)
        .map_err(|_| format!("Invalid integer '{}' in column `{}`", s, column))
}

/// [`parse_count`] that reads a bad cell as null and records why.
fn nullable_count(
    record: &StringRecord,
    idx: Option<usize>,
    column: &str,
    warnings: &mut Vec<String>,
) -> Option<i64> {
    parse_count(idx.and_then(|i| field(record, i)), column).unwrap_or_else(|message| {
        warnings.push(format!("{}, read as null", message));
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "date,county,state,fips,cases,deaths\n\
        2020-03-01,King,Washington,53033,5,0\n\
        2020-03-02,King,Washington,53033,7,1\n";

    fn parse(content: &str) -> ParseResult {
        parse_str(content, detect_delimiter(content), "utf-8".into(), GroupKey::State).unwrap()
    }

    #[test]
    fn test_simple_csv() {
        let result = parse(SAMPLE);

        assert_eq!(result.rows.len(), 2);
        assert!(result.row_errors.is_empty());
        let row = &result.rows[0];
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
        assert_eq!(row.county.as_deref(), Some("King"));
        assert_eq!(row.state, "Washington");
        assert_eq!(row.fips, Some(53033));
        assert_eq!(row.cases, Some(5));
        assert_eq!(row.deaths, Some(0));
    }

    #[test]
    fn test_empty_counts_are_null() {
        let result = parse("date,state,cases,deaths\n2020-03-01,Ohio,,3\n");
        assert_eq!(result.rows[0].cases, None);
        assert_eq!(result.rows[0].deaths, Some(3));
    }

    #[test]
    fn test_fip_alias_and_header_case() {
        let result = parse("Date,County,State,FIP,Cases,Deaths\n2020-03-01,Ada,Idaho,16001,1,0\n");
        assert_eq!(result.rows[0].fips, Some(16001));
    }

    #[test]
    fn test_bad_rows_are_reported_not_fatal() {
        let csv = "date,state,cases,deaths\n\
            2020-03-01,Ohio,1,0\n\
            not-a-date,Ohio,1,0\n\
            2020-03-03,Ohio,many,0\n\
            2020-03-04,,1,0\n";
        let result = parse(csv);

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.row_errors.len(), 2);
        assert_eq!(result.row_errors[0].line, 3);
        assert!(result.row_errors[0].message.contains("Invalid date"));
        assert!(result.row_errors[1].message.contains("`state`"));
        assert_eq!(result.rows_read(), 4);
    }

    #[test]
    fn test_bad_count_cell_is_nulled_not_dropped() {
        let csv = "date,state,fips,cases,deaths\n\
            2020-03-01,Ohio,,many,5\n\
            2020-03-01,Ohio,NYC,2,2\n";
        let result = parse(csv);

        assert!(result.row_errors.is_empty());
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].cases, None);
        assert_eq!(result.rows[0].deaths, Some(5));
        assert_eq!(result.rows[1].fips, None);
        assert_eq!(result.rows[1].cases, Some(2));

        assert_eq!(result.cell_warnings.len(), 2);
        assert_eq!(result.cell_warnings[0].line, 2);
        assert!(result.cell_warnings[0].message.contains("`cases`"));
        assert!(result.cell_warnings[1].message.contains("`fips`"));
    }

    #[test]
    fn test_bad_fips_rejects_row_when_keyed_on_fips() {
        let csv = "date,state,fips,cases,deaths
2020-03-01,Ohio,NYC,2,2
2020-03-01,Ohio,39049,1,0
";
        let result = parse_str(csv, ',', "utf-8".into(), GroupKey::Fips).unwrap();

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.row_errors.len(), 1);
        assert!(result.row_errors[0].message.contains("`fips`"));
        assert!(result.cell_warnings.is_empty());
    }

    #[test]
    fn test_count_formats() {
        assert_eq!(parse_count(Some("12.0"), "cases"), Ok(Some(12)));
        assert_eq!(parse_count(Some("-3.00"), "cases"), Ok(Some(-3)));
        assert!(parse_count(Some("12.5"), "cases").is_err());
        assert!(parse_count(Some("1e3"), "cases").is_err());
        assert!(parse_count(Some("1e30"), "cases").is_err());
        assert!(parse_count(Some("99999999999999999999.0"), "cases").is_err());
        assert!(parse_count(Some("12."), "cases").is_err());
    }

    #[test]
    fn test_empty_lines_skipped() {
        let result = parse("date,state,cases,deaths\n2020-03-01,Ohio,1,0\n\n2020-03-02,Ohio,2,0\n");
        assert_eq!(result.rows.len(), 2);
        assert!(result.row_errors.is_empty());
    }

    #[test]
    fn test_missing_required_column() {
        let err = parse_str("date,state,cases\n2020-03-01,Ohio,1\n", ',', "utf-8".into(), GroupKey::State)
            .unwrap_err();
        assert!(matches!(err, CsvError::MissingColumn(ref c) if c == "deaths"));
    }

    #[test]
    fn test_key_column_required_for_group_key() {
        let err = parse_str("date,state,cases,deaths\n2020-03-01,Ohio,1,0\n", ',', "utf-8".into(), GroupKey::Fips)
            .unwrap_err();
        assert!(matches!(err, CsvError::MissingColumn(ref c) if c == "fips"));

        let result = parse_str(
            "date,county,state,cases,deaths\n2020-03-01,,Ohio,1,0\n",
            ',',
            "utf-8".into(),
            GroupKey::County,
        )
        .unwrap();
        assert!(result.rows.is_empty());
        assert!(result.row_errors[0].message.contains("`county`"));
    }

    #[test]
    fn test_empty_csv_error() {
        let result = parse_bytes_auto(b"", GroupKey::State);
        assert!(matches!(result, Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
    }

    #[test]
    fn test_detect_delimiter_comma() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
    }

    #[test]
    fn test_detect_delimiter_pipe() {
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
    }

    #[test]
    fn test_auto_parse_semicolon() {
        let csv = "date;state;cases;deaths\n2020-03-01;Ohio;1;0\n";
        let result = parse_bytes_auto(csv.as_bytes(), GroupKey::State).unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.headers, vec!["date", "state", "cases", "deaths"]);
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"date,state,cases,deaths\n2020-03-01,Ohio,1,0\n");
        let result = parse_bytes_auto(&bytes, GroupKey::State).unwrap();
        assert_eq!(result.headers[0], "date");
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let result = parse_csv_file_auto(&path, GroupKey::County).unwrap();
        assert_eq!(result.rows.len(), 2);
    }
}
