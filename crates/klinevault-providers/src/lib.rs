//! Data source integrations
//!
//! Source-specific adapters for fetching candle data.
//!
//! ## Supported sources
//!
//! - `binance::vision` - bulk historical archive (complete daily files,
//!   delayed by roughly a day and a half, no rate limiting)
//! - `binance::rest` - real-time API (low latency, weight-budgeted)
//!
//! ## Design principles
//!
//! 1. **Adapter pattern**: convert the source wire format into `Candle`
//! 2. **Typed outcomes**: "no data exists" is `SourceError::NotFound`, never
//!    conflated with a failure
//! 3. **Stateless**: caching and retry policy live above this crate
//! 4. **Documented edge cases**: timestamp precision drift, checksum
//!    availability, header detection
//!
//! The failover engine depends only on the [`ExchangeDataSource`] trait; the
//! set of sources is closed and small, so dispatch is explicit policy logic,
//! not a plugin registry.

pub mod binance;
pub mod source;

pub use binance::{RestSource, VisionSource};
pub use source::{ExchangeDataSource, RangeRequest, SourceError, SourceTier};
