//! Source abstraction consumed by the failover engine

use async_trait::async_trait;
use klinevault_core::{Candle, ChartType, Interval, MarketType};
use thiserror::Error;

/// Which failover tier a source belongs to. The engine only ever budgets
/// weight for the `Rest` tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    /// Bulk historical archive: complete archived days, no rate limiting
    Vision,
    /// Real-time API: recent data, weight-budgeted
    Rest,
}

impl std::fmt::Display for SourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTier::Vision => write!(f, "VISION"),
            SourceTier::Rest => write!(f, "REST"),
        }
    }
}

/// One range fetch against one source. Bounds are inclusive, aligned candle
/// boundaries in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub symbol: String,
    pub market_type: MarketType,
    pub chart_type: ChartType,
    pub interval: Interval,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Source failure classification, the vocabulary of the retry state machine.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source has no data for this slice (e.g. a day before listing).
    /// Terminal and legitimate: the slice is empty, not broken.
    #[error("no data exists for the requested slice")]
    NotFound,

    /// Transient: rate-limit rejection, network trouble, 5xx-class response.
    /// Worth retrying with backoff.
    #[error("retryable source failure: {reason}")]
    Retryable { reason: String },

    /// Permanent for this slice: malformed payload, checksum mismatch,
    /// schema violation. Retrying cannot help.
    #[error("fatal source failure: {reason}")]
    Fatal { reason: String },
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Retryable { .. })
    }
}

/// A provider/tier adapter. Implementations are stateless beyond their HTTP
/// client; retry, budgeting and caching all live in the engine.
#[async_trait]
pub trait ExchangeDataSource: Send + Sync {
    /// Failover tier this source serves.
    fn tier(&self) -> SourceTier;

    /// Fetch candles whose open times fall within the request bounds,
    /// sorted ascending. An empty result means the range exists but holds
    /// no data; `SourceError::NotFound` means the slice itself is absent.
    async fn fetch_range(&self, request: &RangeRequest) -> Result<Vec<Candle>, SourceError>;
}
