//! SDK Utilities
//!
//! Common utilities for the SDK.

mod hashing;
mod time;

pub use hashing::{content_hash, snapshot_checksum};
pub use time::{age_in_days, parse_timestamp};
