//! Transformation module.
//!
//! From typed rows to flat output records:
//! - Aggregate: one observation per (key, date)
//! - Grouper: observations to per-key groups
//! - Pivot: a group to its seven-day window
//! - Flatten: a window to output columns
//! - Pipeline: all of the above, end to end

pub mod aggregate;
pub mod flatten;
pub mod grouper;
pub mod pipeline;
pub mod pivot;

pub use aggregate::aggregate;
pub use flatten::{flat_headers, flatten, flatten_all};
pub use grouper::group_by_key;
pub use pipeline::*;
pub use pivot::{pivot, pivot_entries, pivot_group, pivot_group_entry};
