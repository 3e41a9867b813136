//! Data source, cache and fetch configuration

use klinevault_core::{ChartType, MarketType, Provider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Data source, cache and fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Data provider to fetch from
    pub provider: Provider,

    /// Market segment for data fetching
    pub market_type: MarketType,

    /// Kind of candle series to fetch
    pub chart_type: ChartType,

    /// Base URL for the bulk historical archive
    pub vision_base_url: String,

    /// Base URL for the spot real-time API
    pub rest_base_url_spot: String,

    /// Base URL for the USD-margined futures real-time API
    pub rest_base_url_um: String,

    /// Base URL for the coin-margined futures real-time API
    pub rest_base_url_cm: String,

    /// Directory for cached day files and the metadata index
    pub cache_dir: PathBuf,

    /// Whether day files are written and consulted at all
    pub caching_enabled: bool,

    /// Maximum number of concurrent segment fetches (hard-capped at 100)
    pub max_concurrent_fetches: usize,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Number of retry attempts for transient failures
    pub retry_attempts: u32,

    /// Base delay between retry attempts in milliseconds
    pub retry_base_delay_ms: u64,

    /// Ceiling for a single backoff sleep in milliseconds
    pub retry_max_delay_ms: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Binance,
            market_type: MarketType::Um,
            chart_type: ChartType::Klines,
            vision_base_url: "https://data.binance.vision/data".to_string(),
            rest_base_url_spot: "https://api.binance.com".to_string(),
            rest_base_url_um: "https://fapi.binance.com".to_string(),
            rest_base_url_cm: "https://dapi.binance.com".to_string(),
            cache_dir: PathBuf::from("./data/cache"),
            caching_enabled: true,
            max_concurrent_fetches: 8,
            request_timeout_secs: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl DataConfig {
    /// Real-time API base URL for a market segment.
    pub fn rest_base_url(&self, market: MarketType) -> &str {
        match market {
            MarketType::Spot => &self.rest_base_url_spot,
            MarketType::Um => &self.rest_base_url_um,
            MarketType::Cm => &self.rest_base_url_cm,
        }
    }
}
