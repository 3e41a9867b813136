//! Cache key: one key, at most one day file

use chrono::NaiveDate;
use klinevault_core::{ChartType, Interval, MarketType, Provider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies exactly one cache file covering one UTC calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: Provider,
    pub market_type: MarketType,
    pub chart_type: ChartType,
    pub symbol: String,
    pub interval: Interval,
    pub date: NaiveDate,
}

impl CacheKey {
    pub fn new(
        provider: Provider,
        market_type: MarketType,
        chart_type: ChartType,
        symbol: &str,
        interval: Interval,
        date: NaiveDate,
    ) -> Self {
        Self {
            provider,
            market_type,
            chart_type,
            symbol: symbol.to_uppercase(),
            interval,
            date,
        }
    }

    /// File name of the day file, e.g. `BTCUSDT-1m-2024-01-01.ipc`.
    pub fn file_name(&self) -> String {
        format!("{}-{}-{}.ipc", self.symbol, self.interval, self.date)
    }

    /// Path relative to the cache root:
    /// `<provider>/<market>/<chart>/<SYMBOL>/<interval>/<file>`.
    pub fn rel_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.provider.as_str());
        for segment in self.market_type.archive_path().split('/') {
            path.push(segment);
        }
        path.push(self.chart_type.as_str());
        path.push(&self.symbol);
        path.push(self.interval.as_str());
        path.push(self.file_name());
        path
    }

    /// Stable string form used as the metadata index key.
    pub fn index_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.provider, self.market_type, self.chart_type, self.symbol, self.interval, self.date
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.index_key())
    }
}
