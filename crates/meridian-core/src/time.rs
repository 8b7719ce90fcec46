//! Wall-clock helpers.
//!
//! Operation timestamps are plain `f64` seconds since the Unix epoch. They
//! order conflicting writes heuristically and never carry causal meaning.

use chrono::{DateTime, Utc};

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    to_secs(Utc::now())
}

/// Convert a UTC instant to fractional epoch seconds (microsecond precision).
pub fn to_secs(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_micros() as f64 / 1_000_000.0
}
