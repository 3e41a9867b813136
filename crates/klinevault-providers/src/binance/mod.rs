//! Binance data source adapters
//!
//! Two tiers over the same market data:
//!
//! - `vision` - daily ZIP/CSV files from the bulk archive
//!   (<https://data.binance.vision/>), complete days only, published roughly
//!   a day and a half after the fact, no rate limiting
//! - `rest` - the candle endpoint of the exchange API, paginated and
//!   weight-budgeted, the only tier that can serve the current day
//! - `checksum` - SHA-256 verification for archive downloads; every archive
//!   file has a sibling `.CHECKSUM`
//!
//! Both adapters normalize timestamps to epoch milliseconds on ingest; some
//! newer spot archive files carry microsecond precision.

pub mod checksum;
pub mod rest;
pub mod vision;

pub use checksum::ChecksumError;
pub use rest::RestSource;
pub use vision::VisionSource;
