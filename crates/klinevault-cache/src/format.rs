//! Candle ⇄ DataFrame conversion for the day-file schema
//!
//! The on-disk schema is fixed: the timestamp key plus ten value columns.
//! Reads may project a subset of value columns; whatever was not requested
//! comes back at its default so row shape stays uniform.

use klinevault_core::{Candle, CandleColumn, CandleSource};
use polars::prelude::*;
use thiserror::Error;

/// Full on-disk column set, in schema order. `open_time` is the key and is
/// always present.
pub const CANDLE_COLUMNS: &[&str] = &[
    "open_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close_time",
    "quote_volume",
    "trade_count",
    "taker_buy_volume",
    "taker_buy_quote_volume",
];

/// Schema and row-validation errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing required column: {column}")]
    MissingColumn { column: String },

    #[error("invalid data type for column '{column}': expected {expected}, got {actual}")]
    InvalidDataType {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("candle validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Convert candles to a DataFrame in on-disk schema order.
pub fn candles_to_dataframe(candles: &[Candle]) -> PolarsResult<DataFrame> {
    if candles.is_empty() {
        return Err(PolarsError::NoData("empty candle slice".into()));
    }

    let open_times: Vec<i64> = candles.iter().map(|c| c.open_time).collect();
    let opens: Vec<f64> = candles.iter().map(|c| c.open).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let close_times: Vec<i64> = candles.iter().map(|c| c.close_time).collect();
    let quote_volumes: Vec<f64> = candles.iter().map(|c| c.quote_volume).collect();
    let trade_counts: Vec<i64> = candles.iter().map(|c| c.trade_count as i64).collect();
    let taker_buy_volumes: Vec<f64> = candles.iter().map(|c| c.taker_buy_volume).collect();
    let taker_buy_quote_volumes: Vec<f64> =
        candles.iter().map(|c| c.taker_buy_quote_volume).collect();

    DataFrame::new(vec![
        Column::new("open_time".into(), &open_times),
        Column::new("open".into(), &opens),
        Column::new("high".into(), &highs),
        Column::new("low".into(), &lows),
        Column::new("close".into(), &closes),
        Column::new("volume".into(), &volumes),
        Column::new("close_time".into(), &close_times),
        Column::new("quote_volume".into(), &quote_volumes),
        Column::new("trade_count".into(), &trade_counts),
        Column::new("taker_buy_volume".into(), &taker_buy_volumes),
        Column::new("taker_buy_quote_volume".into(), &taker_buy_quote_volumes),
    ])
}

/// Convert a (possibly column-projected) DataFrame back into candles.
///
/// `open_time` is mandatory; absent value columns are filled with defaults.
/// Rows come back tagged with the given provenance.
pub fn dataframe_to_candles(
    df: &DataFrame,
    source: CandleSource,
) -> Result<Vec<Candle>, SchemaError> {
    let height = df.height();
    if height == 0 {
        return Ok(Vec::new());
    }

    let open_times = extract_i64(df, "open_time")?;
    let opens = extract_f64_opt(df, "open")?;
    let highs = extract_f64_opt(df, "high")?;
    let lows = extract_f64_opt(df, "low")?;
    let closes = extract_f64_opt(df, "close")?;
    let volumes = extract_f64_opt(df, "volume")?;
    let close_times = extract_i64_opt(df, "close_time")?;
    let quote_volumes = extract_f64_opt(df, "quote_volume")?;
    let trade_counts = extract_i64_opt(df, "trade_count")?;
    let taker_buy_volumes = extract_f64_opt(df, "taker_buy_volume")?;
    let taker_buy_quote_volumes = extract_f64_opt(df, "taker_buy_quote_volume")?;

    let pick_f64 = |col: &Option<Vec<f64>>, i: usize| col.as_ref().map_or(0.0, |v| v[i]);
    let pick_i64 = |col: &Option<Vec<i64>>, i: usize| col.as_ref().map_or(0, |v| v[i]);

    let mut candles = Vec::with_capacity(height);
    for i in 0..height {
        candles.push(Candle {
            open_time: open_times[i],
            open: pick_f64(&opens, i),
            high: pick_f64(&highs, i),
            low: pick_f64(&lows, i),
            close: pick_f64(&closes, i),
            volume: pick_f64(&volumes, i),
            close_time: pick_i64(&close_times, i),
            quote_volume: pick_f64(&quote_volumes, i),
            trade_count: pick_i64(&trade_counts, i) as u32,
            taker_buy_volume: pick_f64(&taker_buy_volumes, i),
            taker_buy_quote_volume: pick_f64(&taker_buy_quote_volumes, i),
            source,
        });
    }
    Ok(candles)
}

/// Column names to materialize for a read: the key plus the requested value
/// columns (all of them when no filter is given).
pub fn projection(columns: Option<&[CandleColumn]>) -> Vec<String> {
    match columns {
        None => CANDLE_COLUMNS.iter().map(|s| s.to_string()).collect(),
        Some(cols) => {
            let mut names = Vec::with_capacity(cols.len() + 1);
            names.push("open_time".to_string());
            for col in cols {
                let name = col.name().to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            names
        }
    }
}

/// Per-row sanity checks for candles entering the cache.
///
/// Zero volume and zero trades are legitimate (quiet interval); inverted
/// OHLC bounds or a non-positive interval span are not. Prices may be
/// negative for premium-index charts, so no sign check on price fields.
pub fn validate_candle(c: &Candle) -> Result<(), SchemaError> {
    if c.high < c.low {
        return Err(SchemaError::ValidationFailed {
            message: format!("high ({}) < low ({}) at open_time {}", c.high, c.low, c.open_time),
        });
    }
    if c.open > c.high || c.open < c.low {
        return Err(SchemaError::ValidationFailed {
            message: format!("open outside high-low range at open_time {}", c.open_time),
        });
    }
    if c.close > c.high || c.close < c.low {
        return Err(SchemaError::ValidationFailed {
            message: format!("close outside high-low range at open_time {}", c.open_time),
        });
    }
    if c.volume < 0.0 || c.quote_volume < 0.0 {
        return Err(SchemaError::ValidationFailed {
            message: format!("negative volume at open_time {}", c.open_time),
        });
    }
    if c.close_time <= c.open_time {
        return Err(SchemaError::ValidationFailed {
            message: format!(
                "close_time ({}) <= open_time ({})",
                c.close_time, c.open_time
            ),
        });
    }
    Ok(())
}

fn extract_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>, SchemaError> {
    extract_i64_opt(df, name)?.ok_or_else(|| SchemaError::MissingColumn {
        column: name.to_string(),
    })
}

fn extract_i64_opt(df: &DataFrame, name: &str) -> Result<Option<Vec<i64>>, SchemaError> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let values = column
        .i64()
        .map_err(|_| SchemaError::InvalidDataType {
            column: name.to_string(),
            expected: "i64".to_string(),
            actual: format!("{:?}", column.dtype()),
        })?
        .into_no_null_iter()
        .collect();
    Ok(Some(values))
}

fn extract_f64_opt(df: &DataFrame, name: &str) -> Result<Option<Vec<f64>>, SchemaError> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let values = column
        .f64()
        .map_err(|_| SchemaError::InvalidDataType {
            column: name.to_string(),
            expected: "f64".to_string(),
            actual: format!("{:?}", column.dtype()),
        })?
        .into_no_null_iter()
        .collect();
    Ok(Some(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 12.5,
            close_time: open_time + 59_999,
            quote_volume: 1_256.0,
            trade_count: 42,
            taker_buy_volume: 6.1,
            taker_buy_quote_volume: 613.0,
            source: CandleSource::Vision,
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let original = vec![candle(1_704_067_200_000), candle(1_704_067_260_000)];
        let df = candles_to_dataframe(&original).unwrap();
        assert_eq!(df.width(), CANDLE_COLUMNS.len());

        let restored = dataframe_to_candles(&df, CandleSource::Vision).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn empty_slice_is_rejected() {
        assert!(candles_to_dataframe(&[]).is_err());
    }

    #[test]
    fn projected_frame_fills_defaults() {
        let original = vec![candle(1_704_067_200_000)];
        let df = candles_to_dataframe(&original).unwrap();
        let projected = df.select(["open_time", "close"]).unwrap();

        let restored = dataframe_to_candles(&projected, CandleSource::Cache).unwrap();
        assert_eq!(restored[0].open_time, original[0].open_time);
        assert_eq!(restored[0].close, original[0].close);
        assert_eq!(restored[0].open, 0.0);
        assert_eq!(restored[0].trade_count, 0);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let df = DataFrame::new(vec![Column::new("close".into(), &[1.0f64])]).unwrap();
        assert!(matches!(
            dataframe_to_candles(&df, CandleSource::Cache),
            Err(SchemaError::MissingColumn { .. })
        ));
    }

    #[test]
    fn projection_always_includes_the_key() {
        let cols = projection(Some(&[CandleColumn::Close, CandleColumn::Volume]));
        assert_eq!(cols, vec!["open_time", "close", "volume"]);
        assert_eq!(projection(None).len(), CANDLE_COLUMNS.len());
    }

    #[test]
    fn validation_rejects_inverted_bounds() {
        let mut bad = candle(1_704_067_200_000);
        bad.high = 98.0;
        assert!(matches!(
            validate_candle(&bad),
            Err(SchemaError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn validation_allows_quiet_intervals() {
        let mut quiet = candle(1_704_067_200_000);
        quiet.volume = 0.0;
        quiet.quote_volume = 0.0;
        quiet.trade_count = 0;
        quiet.open = 100.0;
        quiet.high = 100.0;
        quiet.low = 100.0;
        quiet.close = 100.0;
        assert!(validate_candle(&quiet).is_ok());
    }
}
