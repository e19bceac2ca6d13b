//! Collect per-(key, date) observations into one group per key.
//!
//! ```text
//! Observations                      →  Key groups
//! ┌────────────────────────────┐       ┌──────────────────────────┐
//! │ Ohio  2020-03-01           │       │ Ohio                     │
//! │ Ohio  2020-03-02           │  →    │ [03-01, 03-02]           │
//! │ Utah  2020-03-01           │       ├──────────────────────────┤
//! └────────────────────────────┘       │ Utah  [03-01]            │
//!                                      └──────────────────────────┘
//! ```
//!
//! Groups come out in ascending key order; observations keep the order they
//! were encountered in. A group exists only because some observation named
//! its key, so no group is ever empty.

use std::collections::BTreeMap;

use crate::models::{KeyGroup, KeyedObservation, Observation};

/// Group keyed observations by key.
pub fn group_by_key(observations: Vec<KeyedObservation>) -> Vec<KeyGroup> {
    let mut groups: BTreeMap<String, GroupBuilder> = BTreeMap::new();

    for keyed in observations {
        groups
            .entry(keyed.key)
            .or_insert_with(GroupBuilder::new)
            .add(keyed.observation);
    }

    groups
        .into_iter()
        .map(|(key, builder)| builder.build(key))
        .collect()
}

/// Builder for accumulating observations while grouping.
struct GroupBuilder {
    observations: Vec<Observation>,
}

impl GroupBuilder {
    fn new() -> Self {
        Self {
            observations: Vec::new(),
        }
    }

    fn add(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    fn build(self, key: String) -> KeyGroup {
        KeyGroup {
            key,
            observations: self.observations,
        }
    }
}
