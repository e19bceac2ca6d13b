//! Domain models for the casepivot pipeline.
//!
//! - [`RawRow`] - One typed input row
//! - [`Observation`] - One (date, cases, deaths) point after aggregation
//! - [`KeyedObservation`] - An observation tagged with its region key
//! - [`KeyGroup`] - All observations of one key
//! - [`PivotRecord`] - The fixed seven-slot window for one key
//! - [`FlatRecord`] - The window renamed into `day_{i}_*` columns

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Number of slots in every pivot window.
pub const WINDOW_DAYS: usize = 7;

// =============================================================================
// Input rows
// =============================================================================

/// A parsed input row: `date, county, state, fips, cases, deaths`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub date: NaiveDate,
    pub county: Option<String>,
    pub state: String,
    pub fips: Option<i64>,
    pub cases: Option<i64>,
    pub deaths: Option<i64>,
}

/// An input row that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based line number in the source file.
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

// =============================================================================
// Observations
// =============================================================================

/// One data point for a key. Null counts stay null all the way to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub cases: Option<i64>,
    pub deaths: Option<i64>,
}

impl Observation {
    pub fn new(date: NaiveDate, cases: Option<i64>, deaths: Option<i64>) -> Self {
        Self { date, cases, deaths }
    }
}

/// An observation as it arrives from loosely typed sources (JSON), where the
/// date may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObservationEntry {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub cases: Option<i64>,
    #[serde(default)]
    pub deaths: Option<i64>,
}

impl ObservationEntry {
    /// `None` when the entry has no date.
    pub fn to_observation(&self) -> Option<Observation> {
        self.date
            .map(|date| Observation::new(date, self.cases, self.deaths))
    }
}

impl From<Observation> for ObservationEntry {
    fn from(obs: Observation) -> Self {
        Self {
            date: Some(obs.date),
            cases: obs.cases,
            deaths: obs.deaths,
        }
    }
}

/// Aggregator output: one observation for one (key, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedObservation {
    pub key: String,
    #[serde(flatten)]
    pub observation: Observation,
}

// =============================================================================
// Groups
// =============================================================================

/// Every observation of one key, in no particular order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGroup {
    pub key: String,
    pub observations: Vec<Observation>,
}

/// JSON input shape of a group whose observations may lack dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGroupEntry {
    pub key: String,
    #[serde(default)]
    pub observations: Vec<ObservationEntry>,
}

impl From<KeyGroup> for KeyGroupEntry {
    fn from(group: KeyGroup) -> Self {
        Self {
            key: group.key,
            observations: group.observations.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Pivot output
// =============================================================================

/// Fixed seven-slot window for one key, oldest slot first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotRecord {
    pub key: String,
    pub slots: [Observation; WINDOW_DAYS],
}

impl PivotRecord {
    /// 1-based slot accessor (`slot(1)` .. `slot(7)`).
    pub fn slot(&self, day: usize) -> Option<&Observation> {
        day.checked_sub(1).and_then(|idx| self.slots.get(idx))
    }
}

/// A single flattened cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FlatValue {
    Date(NaiveDate),
    Count(Option<i64>),
}

impl FlatValue {
    /// CSV rendering: ISO dates, empty cell for null counts.
    pub fn to_cell(&self) -> String {
        match self {
            FlatValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            FlatValue::Count(Some(n)) => n.to_string(),
            FlatValue::Count(None) => String::new(),
        }
    }
}

/// One output row: the key column followed by `day_{i}_{date,cases,deaths}`.
///
/// Serializes as a JSON object whose keys keep column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRecord {
    pub key_column: String,
    pub key: String,
    pub columns: Vec<(String, FlatValue)>,
}

impl FlatRecord {
    pub fn get(&self, column: &str) -> Option<&FlatValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Cells in header order, key first.
    pub fn to_csv_row(&self) -> Vec<String> {
        std::iter::once(self.key.clone())
            .chain(self.columns.iter().map(|(_, value)| value.to_cell()))
            .collect()
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 1))?;
        map.serialize_entry(&self.key_column, &self.key)?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_entry_without_date() {
        let entry: ObservationEntry = serde_json::from_value(json!({ "cases": 3 })).unwrap();
        assert_eq!(entry.date, None);
        assert!(entry.to_observation().is_none());
    }

    #[test]
    fn test_entry_with_date() {
        let entry: ObservationEntry =
            serde_json::from_value(json!({ "date": "2020-03-01", "cases": 3, "deaths": null }))
                .unwrap();
        let obs = entry.to_observation().unwrap();
        assert_eq!(obs, Observation::new(date("2020-03-01"), Some(3), None));
    }

    #[test]
    fn test_keyed_observation_is_flat_in_json() {
        let keyed = KeyedObservation {
            key: "Ohio".into(),
            observation: Observation::new(date("2020-03-02"), Some(4), Some(0)),
        };
        let value = serde_json::to_value(&keyed).unwrap();
        assert_eq!(value["key"], "Ohio");
        assert_eq!(value["date"], "2020-03-02");
        assert_eq!(value["cases"], 4);
    }

    #[test]
    fn test_slot_accessor_is_one_based() {
        let obs = Observation::new(date("2020-03-01"), Some(1), Some(0));
        let record = PivotRecord {
            key: "Utah".into(),
            slots: [obs; WINDOW_DAYS],
        };
        assert!(record.slot(0).is_none());
        assert_eq!(record.slot(1), Some(&obs));
        assert_eq!(record.slot(7), Some(&obs));
        assert!(record.slot(8).is_none());
    }

    #[test]
    fn test_flat_record_keeps_column_order() {
        let record = FlatRecord {
            key_column: "state".into(),
            key: "Iowa".into(),
            columns: vec![
                ("day_1_date".into(), FlatValue::Date(date("2020-03-01"))),
                ("day_1_cases".into(), FlatValue::Count(None)),
                ("day_1_deaths".into(), FlatValue::Count(Some(2))),
            ],
        };
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(
            text,
            r#"{"state":"Iowa","day_1_date":"2020-03-01","day_1_cases":null,"day_1_deaths":2}"#
        );
        assert_eq!(record.to_csv_row(), vec!["Iowa", "2020-03-01", "", "2"]);
    }
}
