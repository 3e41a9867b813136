//! Bulk archive source: daily candle files
//!
//! Fetches one-day ZIP archives containing a single CSV of candles.
//!
//! # URL pattern
//!
//! ```text
//! {base}/{market_path}/daily/{chart}/{SYMBOL}/{interval}/{SYMBOL}-{interval}-{date}.zip
//! ```
//!
//! Example:
//! ```text
//! https://data.binance.vision/data/spot/daily/klines/BTCUSDT/1m/BTCUSDT-1m-2024-01-01.zip
//! ```
//!
//! The archive only ever holds complete, settled days; asking it for a day
//! it has not published yet is an HTTP 404, which maps to `NotFound` and is
//! the orchestrator's cue to fall back to the real-time tier.

use async_trait::async_trait;
use csv::ReaderBuilder;
use klinevault_core::{normalize_to_millis, utc_day_of, Candle, CandleSource};
use reqwest::Client;
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::time::Duration;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::checksum::{self, ChecksumError};
use crate::source::{ExchangeDataSource, RangeRequest, SourceError, SourceTier};

/// One CSV row of a daily candle file. Column order is fixed; the trailing
/// field is an unused legacy column.
#[derive(Debug, Deserialize)]
pub struct CsvKline(
    pub i64,    // open_time
    pub f64,    // open
    pub f64,    // high
    pub f64,    // low
    pub f64,    // close
    pub f64,    // volume
    pub i64,    // close_time
    pub f64,    // quote_volume
    pub i64,    // trade_count
    pub f64,    // taker_buy_volume
    pub f64,    // taker_buy_quote_volume
    pub String, // ignore
);

impl CsvKline {
    fn into_candle(self) -> Candle {
        Candle {
            open_time: normalize_to_millis(self.0),
            open: self.1,
            high: self.2,
            low: self.3,
            close: self.4,
            volume: self.5,
            close_time: normalize_to_millis(self.6),
            quote_volume: self.7,
            trade_count: self.8.max(0) as u32,
            taker_buy_volume: self.9,
            taker_buy_quote_volume: self.10,
            source: CandleSource::Vision,
        }
    }
}

/// Some newer files ship a header row, older ones do not.
pub fn has_header_row(buffer: &str) -> bool {
    buffer
        .lines()
        .next()
        .is_some_and(|line| line.contains("open_time") || line.contains("close_time"))
}

/// Bulk archive candle source.
pub struct VisionSource {
    client: Client,
    base_url: String,
    checksum_timeout: Duration,
}

impl VisionSource {
    /// `base_url` without a trailing slash, e.g.
    /// `https://data.binance.vision/data`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("failed to build archive HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            checksum_timeout: Duration::from_secs(10),
        }
    }

    fn archive_url(&self, request: &RangeRequest, date_str: &str) -> String {
        format!(
            "{}/{}/daily/{}/{}/{}/{}-{}-{}.zip",
            self.base_url,
            request.market_type.archive_path(),
            request.chart_type.as_str(),
            request.symbol,
            request.interval.as_str(),
            request.symbol,
            request.interval.as_str(),
            date_str
        )
    }

    fn csv_name(request: &RangeRequest, date_str: &str) -> String {
        format!(
            "{}-{}-{}.csv",
            request.symbol,
            request.interval.as_str(),
            date_str
        )
    }
}

#[async_trait]
impl ExchangeDataSource for VisionSource {
    fn tier(&self) -> SourceTier {
        SourceTier::Vision
    }

    async fn fetch_range(&self, request: &RangeRequest) -> Result<Vec<Candle>, SourceError> {
        // Archive granularity is one file per UTC day; the engine only sends
        // this source windows that sit inside a single day.
        let date = utc_day_of(request.start_ms);
        let date_str = date.format("%Y-%m-%d").to_string();
        let url = self.archive_url(request, &date_str);

        debug!(
            event_type = "download_start",
            symbol = %request.symbol,
            date = %date_str,
            url = %url,
            "Downloading daily archive"
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Retryable {
                reason: format!("archive request failed: {e}"),
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!(
                event_type = "archive_not_published",
                symbol = %request.symbol,
                date = %date_str,
                "Archive has no file for this day"
            );
            return Err(SourceError::NotFound);
        }
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(SourceError::Retryable {
                reason: format!("HTTP {status} for {date_str}"),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Fatal {
                reason: format!("HTTP {status} for {date_str}"),
            });
        }

        let zip_bytes = response.bytes().await.map_err(|e| SourceError::Retryable {
            reason: format!("archive body read failed: {e}"),
        })?;

        match checksum::expected_checksum(&self.client, &url, self.checksum_timeout).await {
            Ok(Some(expected)) => match checksum::verify(&zip_bytes, &expected) {
                Ok(()) => {
                    info!(
                        event_type = "checksum_verified",
                        symbol = %request.symbol,
                        date = %date_str,
                        hash = %expected,
                        "Checksum verified"
                    );
                }
                Err(ChecksumError::Mismatch { expected, actual }) => {
                    return Err(SourceError::Fatal {
                        reason: format!(
                            "archive checksum mismatch for {date_str}: expected {expected}, got {actual}"
                        ),
                    });
                }
                Err(e) => {
                    return Err(SourceError::Fatal {
                        reason: format!("checksum verification failed for {date_str}: {e}"),
                    });
                }
            },
            Ok(None) => {
                warn!(
                    event_type = "checksum_skipped",
                    symbol = %request.symbol,
                    date = %date_str,
                    "Checksum unavailable, accepting download unverified"
                );
            }
            Err(ChecksumError::InvalidFormat(msg)) => {
                return Err(SourceError::Fatal {
                    reason: format!("invalid checksum format for {date_str}: {msg}"),
                });
            }
            Err(e) => {
                return Err(SourceError::Retryable {
                    reason: format!("checksum fetch failed for {date_str}: {e}"),
                });
            }
        }

        let cursor = Cursor::new(zip_bytes);
        let mut archive = ZipArchive::new(cursor).map_err(|e| SourceError::Fatal {
            reason: format!("malformed archive for {date_str}: {e}"),
        })?;
        let mut csv_file = archive
            .by_name(&Self::csv_name(request, &date_str))
            .map_err(|e| SourceError::Fatal {
                reason: format!("archive for {date_str} missing expected CSV: {e}"),
            })?;

        let mut buffer = String::with_capacity(4 * 1024 * 1024);
        csv_file
            .read_to_string(&mut buffer)
            .map_err(|e| SourceError::Fatal {
                reason: format!("archive CSV read failed for {date_str}: {e}"),
            })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(has_header_row(&buffer))
            .from_reader(buffer.as_bytes());

        let mut candles = Vec::new();
        for row in reader.deserialize() {
            let csv_kline: CsvKline = row.map_err(|e| SourceError::Fatal {
                reason: format!("archive CSV parse error for {date_str}: {e}"),
            })?;
            let candle = csv_kline.into_candle();
            if candle.open_time >= request.start_ms && candle.open_time <= request.end_ms {
                candles.push(candle);
            }
        }
        candles.sort_by_key(|c| c.open_time);

        info!(
            event_type = "download_complete",
            symbol = %request.symbol,
            date = %date_str,
            rows = candles.len(),
            "Downloaded and parsed daily archive"
        );
        Ok(candles)
    }
}
