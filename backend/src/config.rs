//! Pipeline configuration.
//!
//! Values come from three places, later ones winning:
//! built-in defaults, environment variables (a `.env` file is loaded by the
//! binary), then CLI flags.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::RawRow;

/// Region key column (`state`, `county` or `fips`).
pub const ENV_KEY: &str = "CASEPIVOT_KEY";

/// Worker thread count for the pivot stage.
pub const ENV_WORKERS: &str = "CASEPIVOT_WORKERS";

/// `true` to quarantine failing keys instead of aborting.
pub const ENV_SKIP_INVALID: &str = "CASEPIVOT_SKIP_INVALID";

/// HTTP port for `serve`.
pub const ENV_PORT: &str = "CASEPIVOT_PORT";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Maximum upload size accepted by the HTTP API (50 MB).
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Which input column(s) identify a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    /// One record per state.
    #[default]
    State,
    /// One record per county, keyed `"<state>/<county>"`.
    County,
    /// One record per FIPS code.
    Fips,
}

impl GroupKey {
    /// Output column holding the key.
    pub fn column_name(&self) -> &'static str {
        match self {
            GroupKey::State => "state",
            GroupKey::County => "county",
            GroupKey::Fips => "fips",
        }
    }

    /// Key value for a row, `None` when the row lacks the needed field.
    pub fn key_for(&self, row: &RawRow) -> Option<String> {
        match self {
            GroupKey::State => Some(row.state.clone()),
            GroupKey::County => row
                .county
                .as_deref()
                .map(|county| format!("{}/{}", row.state, county)),
            GroupKey::Fips => row.fips.map(|fips| fips.to_string()),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "state" => Some(GroupKey::State),
            "county" => Some(GroupKey::County),
            "fips" | "fip" => Some(GroupKey::Fips),
            _ => None,
        }
    }
}

/// What the pipeline does when one key fails to pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidKeyPolicy {
    /// Abort the whole run.
    #[default]
    Fail,
    /// Quarantine the key and keep going.
    Skip,
}

/// Explicit configuration handed to every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub group_key: GroupKey,

    /// Fixed worker count for the pivot stage; `None` uses rayon's global pool.
    pub workers: Option<usize>,

    pub invalid_key_policy: InvalidKeyPolicy,

    /// Check every emitted window against its invariants.
    pub validate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            group_key: GroupKey::State,
            workers: None,
            invalid_key_policy: InvalidKeyPolicy::Fail,
            validate: true,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `CASEPIVOT_*` environment variables.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_KEY) {
            config.group_key = GroupKey::parse(&raw).ok_or_else(|| {
                PipelineError::Config(format!(
                    "{ENV_KEY}='{raw}' (expected state, county or fips)"
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_WORKERS) {
            let workers = raw.trim().parse::<usize>().map_err(|e| {
                PipelineError::Config(format!("{ENV_WORKERS}='{raw}': {e}"))
            })?;
            config.workers = Some(workers);
        }

        if let Some(raw) = lookup(ENV_SKIP_INVALID) {
            if parse_flag(&raw).ok_or_else(|| {
                PipelineError::Config(format!("{ENV_SKIP_INVALID}='{raw}' (expected true/false)"))
            })? {
                config.invalid_key_policy = InvalidKeyPolicy::Skip;
            }
        }

        config.check()?;
        Ok(config)
    }

    /// Reject values no stage can run with.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.workers == Some(0) {
            return Err(PipelineError::Config(
                "workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn key_column(&self) -> &'static str {
        self.group_key.column_name()
    }
}

/// HTTP port from `CASEPIVOT_PORT`, if set and valid.
pub fn port_from_env() -> Option<u16> {
    std::env::var(ENV_PORT).ok()?.trim().parse().ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
