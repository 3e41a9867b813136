//! Merge, dedup and gap detection over resolved segments

use crate::candle::Candle;
use crate::window::NormalizedWindow;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A contiguous run of expected boundaries with no candle. Advisory: a gap
/// may reflect a real trading halt, so it travels in the report rather than
/// as an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gap {
    /// First missing boundary, inclusive
    pub start_ms: i64,
    /// Last missing boundary, inclusive
    pub end_ms: i64,
    /// Number of missing candles in the run
    pub missing: u64,
}

/// Violations of the series invariant. These are defects in source data or
/// merge logic, never valid states.
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("series not strictly increasing at index {index}: prev={prev_ms}, curr={curr_ms}")]
    NotMonotonic {
        index: usize,
        prev_ms: i64,
        curr_ms: i64,
    },

    #[error("open_time {open_time_ms} is not aligned to window start {start_ms} (width {width_ms})")]
    Misaligned {
        open_time_ms: i64,
        start_ms: i64,
        width_ms: i64,
    },

    #[error("open_time {open_time_ms} lies outside the window [{start_ms}, {end_ms}]")]
    OutOfWindow {
        open_time_ms: i64,
        start_ms: i64,
        end_ms: i64,
    },
}

/// Concatenate segment results into one series: sort ascending by
/// `open_time`, dropping duplicates in favor of the higher-priority source.
pub fn merge_batches(batches: Vec<Vec<Candle>>) -> Vec<Candle> {
    let mut all: Vec<Candle> = batches.into_iter().flatten().collect();
    all.sort_by(|a, b| {
        a.open_time
            .cmp(&b.open_time)
            .then_with(|| b.source.priority().cmp(&a.source.priority()))
    });
    all.dedup_by(|dup, keep| dup.open_time == keep.open_time);
    all
}

/// Scan a merged, sorted series against the window's expected boundaries and
/// collect the missing runs.
pub fn find_gaps(series: &[Candle], window: &NormalizedWindow) -> Vec<Gap> {
    let width = window.interval.duration_ms();
    let mut gaps: Vec<Gap> = Vec::new();
    let mut cursor = 0usize;

    for boundary in window.boundaries() {
        while cursor < series.len() && series[cursor].open_time < boundary {
            cursor += 1;
        }
        let present = cursor < series.len() && series[cursor].open_time == boundary;
        if present {
            cursor += 1;
            continue;
        }
        match gaps.last_mut() {
            // Extend the current run when this boundary directly follows it.
            Some(gap) if gap.end_ms + width == boundary => {
                gap.end_ms = boundary;
                gap.missing += 1;
            }
            _ => gaps.push(Gap {
                start_ms: boundary,
                end_ms: boundary,
                missing: 1,
            }),
        }
    }
    gaps
}

/// Check the hard invariant on a final series: strictly increasing unique
/// open times, every one aligned to the normalized window.
pub fn verify_series(series: &[Candle], window: &NormalizedWindow) -> Result<(), SeriesError> {
    let width = window.interval.duration_ms();
    let mut prev: Option<i64> = None;

    for (index, candle) in series.iter().enumerate() {
        let ts = candle.open_time;
        if let Some(prev_ms) = prev {
            if ts <= prev_ms {
                return Err(SeriesError::NotMonotonic {
                    index,
                    prev_ms,
                    curr_ms: ts,
                });
            }
        }
        if !window.contains(ts) {
            return Err(SeriesError::OutOfWindow {
                open_time_ms: ts,
                start_ms: window.start_ms,
                end_ms: window.end_ms,
            });
        }
        if (ts - window.start_ms) % width != 0 {
            return Err(SeriesError::Misaligned {
                open_time_ms: ts,
                start_ms: window.start_ms,
                width_ms: width,
            });
        }
        prev = Some(ts);
    }
    Ok(())
}
