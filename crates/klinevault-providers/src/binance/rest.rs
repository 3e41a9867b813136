//! Real-time API candle source
//!
//! Paginates the exchange candle endpoint. Rows arrive as JSON arrays with
//! mixed numeric and string-encoded decimal fields:
//!
//! ```text
//! [ 1704067200000, "42000.10", "42100.20", "41900.30", "42050.40",
//!   "12.50", 1704067259999, "525000.00", 321, "6.20", "260000.00", "0" ]
//! ```
//!
//! This is the only tier that can serve the current day, and the only one
//! the engine charges request weight for.

use async_trait::async_trait;
use klinevault_core::{normalize_to_millis, Candle, CandleSource, ChartType, MarketType};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::source::{ExchangeDataSource, RangeRequest, SourceError, SourceTier};

type RawRow = Vec<serde_json::Value>;

/// Real-time candle source for one market segment.
pub struct RestSource {
    client: Client,
    base_url: String,
    page_limit: u32,
}

impl RestSource {
    /// `base_url` without a trailing slash, e.g. `https://fapi.binance.com`.
    pub fn new(base_url: &str, page_limit: u32, request_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("failed to build real-time HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_limit: page_limit.max(1),
        }
    }

    /// Endpoint path for a market/chart pair.
    fn endpoint_path(market: MarketType, chart: ChartType) -> Result<String, SourceError> {
        let prefix = match market {
            MarketType::Spot => {
                if chart != ChartType::Klines {
                    // Upstream has no spot variant of the derived charts;
                    // request-shape validation should have caught this.
                    return Err(SourceError::Fatal {
                        reason: format!("chart {chart} does not exist on the spot API"),
                    });
                }
                return Ok("/api/v3/klines".to_string());
            }
            MarketType::Um => "/fapi/v1",
            MarketType::Cm => "/dapi/v1",
        };
        Ok(format!("{prefix}/{}", chart.as_str()))
    }
}

/// Parse one wire row into a candle. Index layout is fixed by the API.
pub fn parse_rest_row(row: &RawRow) -> Result<Candle, SourceError> {
    if row.len() < 11 {
        return Err(SourceError::Fatal {
            reason: format!("candle row has {} fields, expected at least 11", row.len()),
        });
    }
    let int = |i: usize| -> Result<i64, SourceError> {
        row[i].as_i64().ok_or_else(|| SourceError::Fatal {
            reason: format!("candle row field {i} is not an integer: {}", row[i]),
        })
    };
    let num = |i: usize| -> Result<f64, SourceError> {
        match &row[i] {
            serde_json::Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_f64(),
        }
        .ok_or_else(|| SourceError::Fatal {
            reason: format!("candle row field {i} is not a decimal: {}", row[i]),
        })
    };

    Ok(Candle {
        open_time: normalize_to_millis(int(0)?),
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
        close_time: normalize_to_millis(int(6)?),
        quote_volume: num(7)?,
        trade_count: int(8)?.max(0) as u32,
        taker_buy_volume: num(9)?,
        taker_buy_quote_volume: num(10)?,
        source: CandleSource::Rest,
    })
}

#[async_trait]
impl ExchangeDataSource for RestSource {
    fn tier(&self) -> SourceTier {
        SourceTier::Rest
    }

    async fn fetch_range(&self, request: &RangeRequest) -> Result<Vec<Candle>, SourceError> {
        let path = Self::endpoint_path(request.market_type, request.chart_type)?;
        let url = format!("{}{}", self.base_url, path);
        let width = request.interval.duration_ms();

        let mut candles: Vec<Candle> = Vec::new();
        let mut cursor = request.start_ms;

        while cursor <= request.end_ms {
            debug!(
                event_type = "rest_page_start",
                symbol = %request.symbol,
                cursor_ms = cursor,
                "Requesting candle page"
            );

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("symbol", request.symbol.as_str()),
                    ("interval", request.interval.as_str()),
                ])
                .query(&[
                    ("startTime", cursor),
                    ("endTime", request.end_ms),
                ])
                .query(&[("limit", self.page_limit)])
                .send()
                .await
                .map_err(|e| SourceError::Retryable {
                    reason: format!("candle page request failed: {e}"),
                })?;

            let status = response.status();
            match status.as_u16() {
                404 => return Err(SourceError::NotFound),
                // 429 = rate limited, 418 = auto-banned for ignoring 429s
                418 | 429 => {
                    return Err(SourceError::Retryable {
                        reason: format!("rate limited (HTTP {status})"),
                    });
                }
                _ if status.is_server_error() => {
                    return Err(SourceError::Retryable {
                        reason: format!("HTTP {status}"),
                    });
                }
                _ if !status.is_success() => {
                    return Err(SourceError::Fatal {
                        reason: format!("HTTP {status}"),
                    });
                }
                _ => {}
            }

            let rows: Vec<RawRow> = response.json().await.map_err(|e| SourceError::Fatal {
                reason: format!("malformed candle payload: {e}"),
            })?;
            if rows.is_empty() {
                break;
            }

            let page_len = rows.len();
            let mut last_open = cursor;
            for row in &rows {
                let candle = parse_rest_row(row)?;
                last_open = candle.open_time;
                if candle.open_time >= request.start_ms && candle.open_time <= request.end_ms {
                    candles.push(candle);
                }
            }

            if (page_len as u32) < self.page_limit {
                break;
            }
            let next = last_open + width;
            if next <= cursor {
                // A page that does not advance the cursor would loop forever.
                break;
            }
            cursor = next;
        }

        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);

        debug!(
            event_type = "rest_fetch_complete",
            symbol = %request.symbol,
            rows = candles.len(),
            "Fetched candle range"
        );
        Ok(candles)
    }
}
