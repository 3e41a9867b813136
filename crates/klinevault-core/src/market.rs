//! Provider, market-type and chart-type enumerations
//!
//! All three are closed sets: the failover chain dispatches over them with
//! plain matches, never open-ended plugin discovery.

use serde::{Deserialize, Serialize};

/// Data provider. Currently one, kept as an enumeration because it namespaces
/// cache keys and rate budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Binance,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Binance => "binance",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market segment a symbol trades on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    /// Spot markets
    Spot,
    /// USD-margined perpetual futures
    #[default]
    Um,
    /// Coin-margined perpetual futures
    Cm,
}

impl MarketType {
    /// Path segment used by both the bulk archive and cache directory layout.
    pub fn archive_path(self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Um => "futures/um",
            MarketType::Cm => "futures/cm",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Um => "um",
            MarketType::Cm => "cm",
        }
    }

    pub fn is_futures(self) -> bool {
        !matches!(self, MarketType::Spot)
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spot" => Ok(MarketType::Spot),
            "um" => Ok(MarketType::Um),
            "cm" => Ok(MarketType::Cm),
            other => Err(format!("unknown market type: {other} (expected spot, um or cm)")),
        }
    }
}

/// Kind of candle series requested.
///
/// Everything except plain `Klines` is derived futures data and only exists
/// on the futures markets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum ChartType {
    #[default]
    Klines,
    MarkPriceKlines,
    IndexPriceKlines,
    PremiumIndexKlines,
}

impl ChartType {
    /// Path segment in archive URLs and the cache directory layout.
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Klines => "klines",
            ChartType::MarkPriceKlines => "markPriceKlines",
            ChartType::IndexPriceKlines => "indexPriceKlines",
            ChartType::PremiumIndexKlines => "premiumIndexKlines",
        }
    }

    pub fn is_futures_only(self) -> bool {
        !matches!(self, ChartType::Klines)
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "klines" => Ok(ChartType::Klines),
            "markPriceKlines" => Ok(ChartType::MarkPriceKlines),
            "indexPriceKlines" => Ok(ChartType::IndexPriceKlines),
            "premiumIndexKlines" => Ok(ChartType::PremiumIndexKlines),
            other => Err(format!("unknown chart type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_paths() {
        assert_eq!(MarketType::Spot.archive_path(), "spot");
        assert_eq!(MarketType::Um.archive_path(), "futures/um");
        assert_eq!(MarketType::Cm.archive_path(), "futures/cm");
    }

    #[test]
    fn chart_type_futures_only() {
        assert!(!ChartType::Klines.is_futures_only());
        assert!(ChartType::MarkPriceKlines.is_futures_only());
        assert!(ChartType::PremiumIndexKlines.is_futures_only());
    }

    #[test]
    fn market_type_round_trip() {
        for m in [MarketType::Spot, MarketType::Um, MarketType::Cm] {
            assert_eq!(m.as_str().parse::<MarketType>().unwrap(), m);
        }
    }
}
