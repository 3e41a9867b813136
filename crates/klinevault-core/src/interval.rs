//! Closed interval enumeration and validity rules

use crate::market::{ChartType, MarketType};
use crate::timestamp::MS_PER_DAY;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Candle interval. A closed enumeration with a fixed width per variant.
///
/// `Mo1` (one month) carries a fixed 30-day width so that boundary alignment
/// stays a single piece of arithmetic shared by every source; calendar drift
/// shows up in the advisory gap report, never as an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Interval {
    #[serde(rename = "1s")]
    S1,
    #[serde(rename = "1m")]
    #[default]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Mo1,
}

impl Interval {
    /// Fixed interval width in milliseconds.
    pub fn duration_ms(self) -> i64 {
        const MINUTE: i64 = 60_000;
        const HOUR: i64 = 60 * MINUTE;
        match self {
            Interval::S1 => 1_000,
            Interval::M1 => MINUTE,
            Interval::M3 => 3 * MINUTE,
            Interval::M5 => 5 * MINUTE,
            Interval::M15 => 15 * MINUTE,
            Interval::M30 => 30 * MINUTE,
            Interval::H1 => HOUR,
            Interval::H2 => 2 * HOUR,
            Interval::H4 => 4 * HOUR,
            Interval::H6 => 6 * HOUR,
            Interval::H8 => 8 * HOUR,
            Interval::H12 => 12 * HOUR,
            Interval::D1 => MS_PER_DAY,
            Interval::D3 => 3 * MS_PER_DAY,
            Interval::W1 => 7 * MS_PER_DAY,
            Interval::Mo1 => 30 * MS_PER_DAY,
        }
    }

    /// Wire/path representation (`1m`, `4h`, `1M`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::S1 => "1s",
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H8 => "8h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::D3 => "3d",
            Interval::W1 => "1w",
            Interval::Mo1 => "1M",
        }
    }

    /// Whether one UTC calendar day is a whole number of intervals.
    ///
    /// Only day-cacheable intervals go through the day-file cache; wider
    /// intervals are served in a single real-time pass.
    pub fn is_day_cacheable(self) -> bool {
        let width = self.duration_ms();
        width <= MS_PER_DAY && MS_PER_DAY % width == 0
    }

    /// Number of candles in one complete UTC day, for day-cacheable intervals.
    pub fn candles_per_day(self) -> Option<u32> {
        if self.is_day_cacheable() {
            Some((MS_PER_DAY / self.duration_ms()) as u32)
        } else {
            None
        }
    }

    /// Sub-minute granularity only exists on the spot market.
    pub fn supported_on(self, market: MarketType) -> bool {
        match self {
            Interval::S1 => market == MarketType::Spot,
            _ => true,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed to parse an interval string.
#[derive(Debug, Error)]
#[error("unknown interval: {0}")]
pub struct IntervalParseError(pub String);

impl std::str::FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s {
            "1s" => Interval::S1,
            "1m" => Interval::M1,
            "3m" => Interval::M3,
            "5m" => Interval::M5,
            "15m" => Interval::M15,
            "30m" => Interval::M30,
            "1h" => Interval::H1,
            "2h" => Interval::H2,
            "4h" => Interval::H4,
            "6h" => Interval::H6,
            "8h" => Interval::H8,
            "12h" => Interval::H12,
            "1d" => Interval::D1,
            "3d" => Interval::D3,
            "1w" => Interval::W1,
            "1M" => Interval::Mo1,
            other => return Err(IntervalParseError(other.to_string())),
        };
        Ok(interval)
    }
}

/// The requested (market, chart, interval) combination does not exist
/// upstream and is rejected before any I/O.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("interval {interval} is not available for {market} {chart}")]
pub struct UnsupportedInterval {
    pub interval: Interval,
    pub market: MarketType,
    pub chart: ChartType,
}

/// Validate a request shape against the closed upstream catalog.
pub fn validate_request_shape(
    market: MarketType,
    chart: ChartType,
    interval: Interval,
) -> Result<(), UnsupportedInterval> {
    let supported = interval.supported_on(market) && (!chart.is_futures_only() || market.is_futures());
    if supported {
        Ok(())
    } else {
        Err(UnsupportedInterval {
            interval,
            market,
            chart,
        })
    }
}
