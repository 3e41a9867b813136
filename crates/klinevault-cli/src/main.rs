//! Command-line candle fetcher
//!
//! Thin wrapper over the data manager: parse a range, run one `get_data`
//! call, print the report, optionally dump the series to CSV.

use chrono::DateTime;
use clap::Parser;
use klinevault::{
    Candle, DataManager, FetchRequest, Interval, ManagerConfig, Settings, SourcePolicy, TimeWindow,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "klinevault", about = "Fetch candles through the failover cache", version)]
struct Args {
    /// Trading symbol, e.g. BTCUSDT
    #[arg(long)]
    symbol: String,

    /// Candle interval (1s, 1m, 5m, 1h, 1d, ...)
    #[arg(long, default_value = "1m")]
    interval: Interval,

    /// Range start, RFC 3339 (e.g. 2024-01-01T00:00:00Z)
    #[arg(long)]
    start: String,

    /// Range end, RFC 3339, inclusive
    #[arg(long)]
    end: String,

    /// Source policy: auto, cache-only, vision-only or rest-only
    #[arg(long, default_value = "auto")]
    policy: SourcePolicy,

    /// TOML configuration file (defaults to klinevault.toml + environment)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable the day-file cache for this run
    #[arg(long)]
    no_cache: bool,

    /// Write the merged series to a CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.app.log_level.as_filter())),
        )
        .init();

    let mut config = ManagerConfig::from_settings(&settings);
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }
    if args.no_cache {
        config.caching_enabled = false;
    }

    let window = TimeWindow::new(
        DateTime::parse_from_rfc3339(&args.start)?.timestamp_millis(),
        DateTime::parse_from_rfc3339(&args.end)?.timestamp_millis(),
    );

    let manager = DataManager::new(config)?;
    let (candles, report) = manager
        .get_data(&FetchRequest {
            symbol: args.symbol.clone(),
            interval: args.interval,
            window,
            source_policy: args.policy,
        })
        .await?;

    println!(
        "{} {}: {} candles ({} expected)",
        args.symbol, args.interval, report.returned_count, report.expected_count
    );
    println!(
        "segments: {} cache, {} archive, {} real-time, {} empty, {} failed; {} cached",
        report.cache_hits,
        report.vision_segments,
        report.rest_segments,
        report.empty_segments,
        report.failed_segments.len(),
        report.cache_writes,
    );
    for failed in &report.failed_segments {
        println!("  failed {}: {} (attempts: {})", failed.date, failed.reason, failed.attempts);
    }
    for gap in &report.gaps {
        println!("  gap: {} .. {} ({} candles)", gap.start_ms, gap.end_ms, gap.missing);
    }

    if let Some(path) = args.csv {
        write_csv(&path, &candles)?;
        println!("wrote {} rows to {}", candles.len(), path.display());
    }

    Ok(())
}

fn write_csv(path: &PathBuf, candles: &[Candle]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for candle in candles {
        writer.serialize(candle)?;
    }
    writer.flush()?;
    Ok(())
}
