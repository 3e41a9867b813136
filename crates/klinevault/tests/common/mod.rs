//! Shared test fixtures: scripted sources and deterministic candle synthesis

#![allow(dead_code)]

use async_trait::async_trait;
use klinevault::config::LimitsConfig;
use klinevault::{
    Candle, CandleSource, ChartType, ExchangeDataSource, ManagerConfig, MarketType, Provider,
    RangeRequest, RetryPolicy, SourceError, SourceTier,
};
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

pub type Handler = Box<dyn Fn(&RangeRequest) -> Result<Vec<Candle>, SourceError> + Send + Sync>;

/// A source whose behavior is a closure and whose call count is observable
/// from the outside.
pub struct MockSource {
    tier: SourceTier,
    calls: Arc<AtomicUsize>,
    handler: Handler,
}

impl MockSource {
    pub fn new(tier: SourceTier, handler: Handler) -> (Arc<dyn ExchangeDataSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(Self {
            tier,
            calls: Arc::clone(&calls),
            handler,
        });
        (source, calls)
    }

    /// Serves synthetic candles for whatever range is asked.
    pub fn serving(tier: SourceTier) -> (Arc<dyn ExchangeDataSource>, Arc<AtomicUsize>) {
        let tag = tier_tag(tier);
        Self::new(tier, Box::new(move |req| Ok(synth_candles(req, tag))))
    }

    /// Always reports that no data exists.
    pub fn not_found(tier: SourceTier) -> (Arc<dyn ExchangeDataSource>, Arc<AtomicUsize>) {
        Self::new(tier, Box::new(|_| Err(SourceError::NotFound)))
    }
}

#[async_trait]
impl ExchangeDataSource for MockSource {
    fn tier(&self) -> SourceTier {
        self.tier
    }

    async fn fetch_range(&self, request: &RangeRequest) -> Result<Vec<Candle>, SourceError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        (self.handler)(request)
    }
}

pub fn tier_tag(tier: SourceTier) -> CandleSource {
    match tier {
        SourceTier::Vision => CandleSource::Vision,
        SourceTier::Rest => CandleSource::Rest,
    }
}

/// Deterministic candles for every boundary in the requested range: the same
/// range always yields the same values, which is what the idempotence
/// assertions lean on.
pub fn synth_candles(request: &RangeRequest, source: CandleSource) -> Vec<Candle> {
    let width = request.interval.duration_ms();
    let mut candles = Vec::new();
    let mut ts = request.start_ms;
    while ts <= request.end_ms {
        let seed = ((ts / width) % 500) as f64;
        let open = 40_000.0 + seed;
        candles.push(Candle {
            open_time: ts,
            open,
            high: open + 25.0,
            low: open - 25.0,
            close: open + 10.0,
            volume: 3.5 + seed / 100.0,
            close_time: ts + width - 1,
            quote_volume: open * 3.5,
            trade_count: 120 + (seed as u32),
            taker_buy_volume: 1.75,
            taker_buy_quote_volume: open * 1.75,
            source,
        });
        ts += width;
    }
    candles
}

/// Manager configuration pointed at a temp cache with fast retries. The base
/// URLs are placeholders; tests always inject mock sources.
pub fn manager_config(cache_root: &Path, caching_enabled: bool) -> ManagerConfig {
    ManagerConfig {
        provider: Provider::Binance,
        market_type: MarketType::Um,
        chart_type: ChartType::Klines,
        cache_dir: cache_root.join("cache"),
        caching_enabled,
        max_concurrency: 4,
        request_timeout: Duration::from_secs(5),
        vision_base_url: "http://127.0.0.1:1/vision".to_string(),
        rest_base_url: "http://127.0.0.1:1/rest".to_string(),
        limits: LimitsConfig {
            weight_limit_per_minute: 10_000,
            kline_request_weight: 2,
            rest_page_limit: 1_000,
            vision_delay_hours: 40,
            budget_wait_cap_ms: 5,
        },
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}
