//! Boundary normalization and UTC-day segmentation
//!
//! User-supplied instants may carry sub-interval precision; they are never
//! assumed pre-aligned. Normalization applies one rule set no matter which
//! source later serves the data: start rounds up to the next interval
//! boundary, end rounds down, and both resulting bounds are inclusive.

use crate::interval::Interval;
use crate::timestamp::{utc_day_of, utc_day_start_ms, MS_PER_DAY};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw, possibly unaligned request bounds (epoch ms, UTC).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }
}

/// Normalization failures. Both are request-fatal and caught before any
/// network round-trip; source APIs reject future queries with a hard error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window collapsed after alignment: start {start_ms} is after end {end_ms}")]
    Collapsed { start_ms: i64, end_ms: i64 },

    #[error("requested bound {ts_ms} is in the future (now: {now_ms})")]
    FutureTimestamp { ts_ms: i64, now_ms: i64 },
}

/// An interval-aligned, inclusive window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedWindow {
    /// First candle boundary, inclusive
    pub start_ms: i64,
    /// Last candle boundary, inclusive
    pub end_ms: i64,
    pub interval: Interval,
}

impl NormalizedWindow {
    /// Align raw bounds to interval boundaries.
    ///
    /// `now_ms` is the caller's clock; bounds beyond it are rejected up
    /// front rather than surfacing later as source errors.
    pub fn normalize(raw: TimeWindow, interval: Interval, now_ms: i64) -> Result<Self, WindowError> {
        for ts_ms in [raw.start_ms, raw.end_ms] {
            if ts_ms > now_ms {
                return Err(WindowError::FutureTimestamp { ts_ms, now_ms });
            }
        }

        let width = interval.duration_ms();
        let start_ms = raw.start_ms.div_euclid(width) * width
            + if raw.start_ms.rem_euclid(width) == 0 { 0 } else { width };
        let end_ms = raw.end_ms.div_euclid(width) * width;

        if start_ms > end_ms {
            return Err(WindowError::Collapsed { start_ms, end_ms });
        }

        Ok(Self {
            start_ms,
            end_ms,
            interval,
        })
    }

    /// Number of candle boundaries the window spans. Advisory: a shorter
    /// result is a legitimate outcome when trading halted, not an error.
    pub fn expected_count(&self) -> u64 {
        ((self.end_ms - self.start_ms) / self.interval.duration_ms()) as u64 + 1
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms <= self.end_ms
    }

    /// Iterate every expected candle boundary, ascending.
    pub fn boundaries(&self) -> impl Iterator<Item = i64> + '_ {
        let width = self.interval.duration_ms();
        (0..self.expected_count() as i64).map(move |i| self.start_ms + i * width)
    }

    /// Split into one segment per UTC calendar day spanned.
    ///
    /// Intervals wider than a day cannot be carved at day granularity; they
    /// come back as a single segment covering the whole window.
    pub fn day_segments(&self) -> Vec<DaySegment> {
        let width = self.interval.duration_ms();
        if !self.interval.is_day_cacheable() {
            return vec![DaySegment {
                date: utc_day_of(self.start_ms),
                window: *self,
            }];
        }

        let mut segments = Vec::new();
        let mut date = utc_day_of(self.start_ms);
        let last_date = utc_day_of(self.end_ms);
        while date <= last_date {
            let day_start = utc_day_start_ms(date);
            // Width divides the day, so the day's last boundary is fixed.
            let day_last = day_start + MS_PER_DAY - width;
            let start_ms = self.start_ms.max(day_start);
            let end_ms = self.end_ms.min(day_last);
            segments.push(DaySegment {
                date,
                window: NormalizedWindow {
                    start_ms,
                    end_ms,
                    interval: self.interval,
                },
            });
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        segments
    }
}

/// One UTC calendar day's slice of a request: the unit of caching and
/// fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySegment {
    pub date: NaiveDate,
    pub window: NormalizedWindow,
}

impl DaySegment {
    /// Whether the segment spans its complete calendar day. Only full days
    /// are eligible for the cache.
    pub fn is_full_day(&self) -> bool {
        let interval = self.window.interval;
        if !interval.is_day_cacheable() {
            return false;
        }
        let day_start = utc_day_start_ms(self.date);
        self.window.start_ms == day_start
            && self.window.end_ms == day_start + MS_PER_DAY - interval.duration_ms()
    }

    /// The full-day window for this segment's date, regardless of how much
    /// of the day the request asked for.
    pub fn full_day_window(&self) -> NormalizedWindow {
        let day_start = utc_day_start_ms(self.date);
        NormalizedWindow {
            start_ms: day_start,
            end_ms: day_start + MS_PER_DAY - self.window.interval.duration_ms(),
            interval: self.window.interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN1: i64 = 1_704_067_200_000; // 2024-01-01 00:00:00 UTC
    const FAR_FUTURE: i64 = 4_102_444_800_000; // 2100-01-01

    #[test]
    fn aligned_bounds_pass_through() {
        let raw = TimeWindow::new(JAN1, JAN1 + 3_600_000);
        let w = NormalizedWindow::normalize(raw, Interval::M1, FAR_FUTURE).unwrap();
        assert_eq!(w.start_ms, JAN1);
        assert_eq!(w.end_ms, JAN1 + 3_600_000);
        assert_eq!(w.expected_count(), 61);
    }

    #[test]
    fn start_rounds_up_end_rounds_down() {
        let raw = TimeWindow::new(JAN1 + 1, JAN1 + 119_999);
        let w = NormalizedWindow::normalize(raw, Interval::M1, FAR_FUTURE).unwrap();
        assert_eq!(w.start_ms, JAN1 + 60_000);
        assert_eq!(w.end_ms, JAN1 + 60_000);
        assert_eq!(w.expected_count(), 1);
    }

    #[test]
    fn collapsed_window_is_rejected() {
        // Both bounds inside the same minute, neither aligned.
        let raw = TimeWindow::new(JAN1 + 1_000, JAN1 + 2_000);
        let err = NormalizedWindow::normalize(raw, Interval::M1, FAR_FUTURE).unwrap_err();
        assert!(matches!(err, WindowError::Collapsed { .. }));
    }

    #[test]
    fn future_bounds_are_rejected_before_io() {
        let raw = TimeWindow::new(JAN1, FAR_FUTURE + 1);
        let err = NormalizedWindow::normalize(raw, Interval::M1, FAR_FUTURE).unwrap_err();
        assert!(matches!(err, WindowError::FutureTimestamp { .. }));
    }

    #[test]
    fn full_day_expected_count() {
        let raw = TimeWindow::new(JAN1, JAN1 + MS_PER_DAY - 60_000);
        let w = NormalizedWindow::normalize(raw, Interval::M1, FAR_FUTURE).unwrap();
        assert_eq!(w.expected_count(), 1440);
    }

    #[test]
    fn day_segmentation_spans_and_clamps() {
        // 2023-12-31 12:00 .. 2024-01-02 06:00 at 1h
        let raw = TimeWindow::new(JAN1 - MS_PER_DAY / 2, JAN1 + MS_PER_DAY + 6 * 3_600_000);
        let w = NormalizedWindow::normalize(raw, Interval::H1, FAR_FUTURE).unwrap();
        let segments = w.day_segments();
        assert_eq!(segments.len(), 3);

        assert!(!segments[0].is_full_day());
        assert_eq!(segments[0].window.expected_count(), 12);

        assert!(segments[1].is_full_day());
        assert_eq!(segments[1].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(segments[1].window.expected_count(), 24);

        assert!(!segments[2].is_full_day());
        assert_eq!(segments[2].window.expected_count(), 7);
    }

    #[test]
    fn wide_intervals_stay_single_segment() {
        let raw = TimeWindow::new(JAN1, JAN1 + 30 * MS_PER_DAY);
        let w = NormalizedWindow::normalize(raw, Interval::W1, FAR_FUTURE).unwrap();
        let segments = w.day_segments();
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].is_full_day());
        assert_eq!(segments[0].window, w);
    }

    #[test]
    fn boundaries_enumerate_every_slot() {
        let raw = TimeWindow::new(JAN1, JAN1 + 4 * 60_000);
        let w = NormalizedWindow::normalize(raw, Interval::M1, FAR_FUTURE).unwrap();
        let bounds: Vec<i64> = w.boundaries().collect();
        assert_eq!(bounds.len(), 5);
        assert_eq!(bounds[0], JAN1);
        assert_eq!(bounds[4], JAN1 + 4 * 60_000);
    }

    #[test]
    fn full_day_window_ignores_partial_request() {
        let raw = TimeWindow::new(JAN1 + 3_600_000, JAN1 + 7_200_000);
        let w = NormalizedWindow::normalize(raw, Interval::M1, FAR_FUTURE).unwrap();
        let segment = &w.day_segments()[0];
        let full = segment.full_day_window();
        assert_eq!(full.start_ms, JAN1);
        assert_eq!(full.expected_count(), 1440);
    }
}
