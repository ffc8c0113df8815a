// src/models/mod.rs

pub mod actor;
pub mod comment;
pub mod engagement;
pub mod post;

use chrono::{DateTime, Utc};

/// Timestamps are stored as epoch milliseconds so ordering in SQL is exact.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
