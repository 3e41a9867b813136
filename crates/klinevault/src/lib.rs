//! Failover candle retrieval for market data.
//!
//! Retrieves OHLCV candles for a symbol/interval over a UTC range from
//! whichever tier is fastest and most complete: a local checksummed day-file
//! cache, a bulk historical archive serving complete settled days, or a
//! rate-limited real-time API. Results merge into one gap-checked,
//! deduplicated, strictly monotonic series with per-row provenance.
//!
//! ## Meta-crate
//!
//! This crate re-exports the workspace sub-crates. New code can depend on
//! the specific sub-crates directly:
//!
//! - `klinevault-core` - domain types, window normalization, series assembly
//! - `klinevault-cache` - checksummed columnar day-file cache
//! - `klinevault-providers` - archive and real-time source adapters
//! - `klinevault-config` - layered configuration
//! - `klinevault-engine` - rate budgeting, bounded fetching, the manager
//!
//! ## Features
//!
//! - `cache` - day-file cache
//! - `providers` - source adapters
//! - `config` - configuration management
//! - `engine` - the data manager (pulls in everything above)
//! - `full` - all of the above (default)
//!
//! ## Basic usage
//!
//! ```rust,no_run
//! use klinevault::{DataManager, FetchRequest, Interval, ManagerConfig, SourcePolicy, TimeWindow};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DataManager::new(ManagerConfig::from_settings(&klinevault::Settings::load()?))?;
//! let (candles, report) = manager
//!     .get_data(&FetchRequest {
//!         symbol: "BTCUSDT".to_string(),
//!         interval: Interval::M1,
//!         window: TimeWindow::new(1_704_067_200_000, 1_704_153_540_000),
//!         source_policy: SourcePolicy::Auto,
//!     })
//!     .await?;
//! println!("{} candles, {} gaps", candles.len(), report.gaps.len());
//! # Ok(())
//! # }
//! ```

// Re-export core (always available)
pub use klinevault_core as core;

#[cfg(feature = "cache")]
pub use klinevault_cache as cache;

#[cfg(feature = "providers")]
pub use klinevault_providers as providers;

#[cfg(feature = "config")]
pub use klinevault_config as config;

#[cfg(feature = "engine")]
pub use klinevault_engine as engine;

// Re-export commonly used types at the crate root for convenience
pub use klinevault_core::{
    Candle, CandleColumn, CandleSource, ChartType, Gap, Interval, MarketType, NormalizedWindow,
    Provider, TimeWindow,
};

#[cfg(feature = "cache")]
pub use klinevault_cache::{CacheKey, CacheStore};

#[cfg(feature = "providers")]
pub use klinevault_providers::{ExchangeDataSource, RangeRequest, SourceError, SourceTier};

#[cfg(feature = "config")]
pub use klinevault_config::Settings;

#[cfg(feature = "engine")]
pub use klinevault_engine::{
    DataError, DataManager, FetchReport, FetchRequest, ManagerConfig, RetryPolicy, SourcePolicy,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
