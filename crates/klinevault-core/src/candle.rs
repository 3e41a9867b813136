//! Candle record and provenance tag

use serde::{Deserialize, Serialize};

/// Which tier of the failover chain produced a candle.
///
/// Attached per row so callers can audit where every candle in a merged
/// series came from. Never persisted: a candle read back from disk is
/// `Cache` by construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CandleSource {
    /// Served from the local day-file cache (already validated, complete day)
    Cache,
    /// Served from the bulk historical archive (complete archived day)
    Vision,
    /// Served from the rate-limited real-time API (may cover a partial day)
    #[default]
    Rest,
}

impl CandleSource {
    /// Merge priority when two sources produced the same `open_time`.
    /// Cache and Vision rows are validated complete days; REST rows for the
    /// current day are provisional.
    pub fn priority(self) -> u8 {
        match self {
            CandleSource::Cache => 2,
            CandleSource::Vision => 1,
            CandleSource::Rest => 0,
        }
    }
}

impl std::fmt::Display for CandleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandleSource::Cache => write!(f, "CACHE"),
            CandleSource::Vision => write!(f, "VISION"),
            CandleSource::Rest => write!(f, "REST"),
        }
    }
}

/// One OHLCV record.
///
/// `open_time` (epoch milliseconds, UTC) is the authoritative key: within any
/// returned series open times are strictly increasing, unique, and each one
/// equals the window start plus an integer multiple of the interval width.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    /// Opening timestamp in epoch milliseconds (UTC), authoritative key
    pub open_time: i64,

    /// Opening price
    pub open: f64,

    /// Highest price in the interval
    pub high: f64,

    /// Lowest price in the interval
    pub low: f64,

    /// Closing price
    pub close: f64,

    /// Base-asset volume
    pub volume: f64,

    /// Closing timestamp in epoch milliseconds (UTC)
    pub close_time: i64,

    /// Quote-asset volume
    pub quote_volume: f64,

    /// Number of trades in the interval
    pub trade_count: u32,

    /// Base-asset volume from taker buy orders
    pub taker_buy_volume: f64,

    /// Quote-asset volume from taker buy orders
    pub taker_buy_quote_volume: f64,

    /// Provenance tag, set by whichever tier served the row
    #[serde(default)]
    pub source: CandleSource,
}

impl Candle {
    /// Re-tag provenance, e.g. after reading a cached file back from disk.
    pub fn with_source(mut self, source: CandleSource) -> Self {
        self.source = source;
        self
    }
}

/// Addressable non-key columns of the cache file schema.
///
/// `open_time` is always materialized and therefore not listed here; a read
/// with a column filter gets the timestamp key plus exactly the requested
/// columns, with the rest left at their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleColumn {
    Open,
    High,
    Low,
    Close,
    Volume,
    CloseTime,
    QuoteVolume,
    TradeCount,
    TakerBuyVolume,
    TakerBuyQuoteVolume,
}

impl CandleColumn {
    /// All columns, in on-disk schema order.
    pub const ALL: [CandleColumn; 10] = [
        CandleColumn::Open,
        CandleColumn::High,
        CandleColumn::Low,
        CandleColumn::Close,
        CandleColumn::Volume,
        CandleColumn::CloseTime,
        CandleColumn::QuoteVolume,
        CandleColumn::TradeCount,
        CandleColumn::TakerBuyVolume,
        CandleColumn::TakerBuyQuoteVolume,
    ];

    /// Column name as stored in the day-file schema.
    pub fn name(self) -> &'static str {
        match self {
            CandleColumn::Open => "open",
            CandleColumn::High => "high",
            CandleColumn::Low => "low",
            CandleColumn::Close => "close",
            CandleColumn::Volume => "volume",
            CandleColumn::CloseTime => "close_time",
            CandleColumn::QuoteVolume => "quote_volume",
            CandleColumn::TradeCount => "trade_count",
            CandleColumn::TakerBuyVolume => "taker_buy_volume",
            CandleColumn::TakerBuyQuoteVolume => "taker_buy_quote_volume",
        }
    }
}
