//! HTTP API module.
//!
//! The axum server, its response types, and the log broadcaster the whole
//! crate logs through.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server};
pub use types::*;
