//! Epoch-millisecond normalization utilities
//!
//! All timestamps inside the workspace are epoch milliseconds (UTC). Source
//! payloads are not consistent: the bulk archive switched some daily files
//! from millisecond to microsecond precision, so every ingested timestamp
//! goes through [`normalize_to_millis`] first.

use chrono::{DateTime, NaiveDate, Utc};

/// Milliseconds in one UTC calendar day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Values at or above this are microsecond timestamps.
/// Millisecond epochs are 13 digits until the year 5138; microsecond epochs
/// crossed 16 digits in 2001.
const MICROSECOND_FLOOR: i64 = 100_000_000_000_000;

/// Normalize a raw source timestamp to epoch milliseconds.
pub fn normalize_to_millis(raw: i64) -> i64 {
    if raw >= MICROSECOND_FLOOR {
        raw / 1_000
    } else {
        raw
    }
}

/// UTC calendar day containing the given epoch-millisecond instant.
pub fn utc_day_of(ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Epoch milliseconds at 00:00:00 UTC of the given day.
pub fn utc_day_start_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}
