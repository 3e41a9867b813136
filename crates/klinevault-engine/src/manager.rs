//! The data manager: cache first, bulk archive for settled days, real-time
//! API as fallback
//!
//! `get_data` decomposes a normalized window into UTC-day segments and
//! resolves each one independently on the worker pool. Resolution order per
//! segment under the automatic policy:
//!
//! 1. cache lookup (verified against its checksum)
//! 2. bulk archive, when the day is old enough to be published there
//! 3. real-time API, for recent days and as fallback when the archive
//!    misses or fails
//!
//! Complete, freshly fetched days are written back to the cache; a partial
//! day ("today so far") never is. Segment failures become gaps in the
//! report, not request errors.

use chrono::{NaiveDate, Utc};
use klinevault_cache::{CacheError, CacheKey, CacheStore};
use klinevault_config::{LimitsConfig, Settings};
use klinevault_core::{
    find_gaps, interval::validate_request_shape, merge_batches, verify_series, Candle, ChartType,
    DaySegment, Gap, Interval, MarketType, NormalizedWindow, Provider, SeriesError, TimeWindow,
    UnsupportedInterval, WindowError, MS_PER_DAY,
};
use klinevault_providers::{ExchangeDataSource, RangeRequest, RestSource, VisionSource};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fetch::{FetchManager, SegmentOutcome};
use crate::retry::RetryPolicy;

/// Which tiers a request may consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourcePolicy {
    /// Cache, then archive for settled days, then real-time API.
    Auto,
    /// Cache only; anything not cached is reported as a gap.
    CacheOnly,
    /// Bulk archive only.
    VisionOnly,
    /// Real-time API only.
    RestOnly,
}

impl std::fmt::Display for SourcePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourcePolicy::Auto => "auto",
            SourcePolicy::CacheOnly => "cache-only",
            SourcePolicy::VisionOnly => "vision-only",
            SourcePolicy::RestOnly => "rest-only",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SourcePolicy::Auto),
            "cache-only" => Ok(SourcePolicy::CacheOnly),
            "vision-only" => Ok(SourcePolicy::VisionOnly),
            "rest-only" => Ok(SourcePolicy::RestOnly),
            other => Err(format!("unknown source policy: {other}")),
        }
    }
}

/// One `get_data` call.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub symbol: String,
    pub interval: Interval,
    pub window: TimeWindow,
    pub source_policy: SourcePolicy,
}

/// A segment that failed fatally; the corresponding range shows up in
/// `FetchReport::gaps` as well.
#[derive(Debug, Clone, Serialize)]
pub struct FailedSegment {
    pub date: NaiveDate,
    pub reason: String,
    pub attempts: u32,
}

/// What happened while assembling a series. Advisory companion to the data:
/// a caller always gets either a fatal error or data plus this report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    /// Candles the normalized window could hold
    pub expected_count: u64,
    /// Candles actually returned
    pub returned_count: usize,
    /// Segments served from the cache
    pub cache_hits: usize,
    /// Segments served from the bulk archive
    pub vision_segments: usize,
    /// Segments served from the real-time API
    pub rest_segments: usize,
    /// Complete days written back to the cache
    pub cache_writes: usize,
    /// Segments that resolved to legitimately no data
    pub empty_segments: usize,
    /// Segments that failed fatally after retries
    pub failed_segments: Vec<FailedSegment>,
    /// Expected boundaries with no candle, coalesced into runs
    pub gaps: Vec<Gap>,
    /// Cache integrity faults observed since the store was opened
    pub integrity_faults: u64,
}

/// Request-fatal failures. Segment-level trouble never shows up here.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("source policy {policy} contradicts manager configuration: {reason}")]
    Contradiction {
        policy: SourcePolicy,
        reason: String,
    },

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedInterval),

    #[error("cache store error: {0}")]
    Cache(#[from] CacheError),

    #[error("request cancelled")]
    Cancelled,

    #[error("merged series violated its invariant: {0}")]
    Internal(#[from] SeriesError),
}

/// Everything a manager needs, injected at construction. No global state.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub provider: Provider,
    pub market_type: MarketType,
    pub chart_type: ChartType,
    pub cache_dir: PathBuf,
    pub caching_enabled: bool,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub vision_base_url: String,
    pub rest_base_url: String,
    pub limits: LimitsConfig,
    pub retry: RetryPolicy,
}

impl ManagerConfig {
    /// Collapse layered settings into a manager configuration.
    pub fn from_settings(settings: &Settings) -> Self {
        let data = &settings.data;
        Self {
            provider: data.provider,
            market_type: data.market_type,
            chart_type: data.chart_type,
            cache_dir: data.cache_dir.clone(),
            caching_enabled: data.caching_enabled,
            max_concurrency: data.max_concurrent_fetches,
            request_timeout: Duration::from_secs(data.request_timeout_secs),
            vision_base_url: data.vision_base_url.clone(),
            rest_base_url: data.rest_base_url(data.market_type).to_string(),
            limits: settings.limits.clone(),
            retry: RetryPolicy {
                max_retries: data.retry_attempts,
                base_delay: Duration::from_millis(data.retry_base_delay_ms),
                max_delay: Duration::from_millis(data.retry_max_delay_ms),
            },
        }
    }
}

/// Top-level entry point for candle retrieval.
pub struct DataManager {
    config: ManagerConfig,
    cache: Option<Arc<CacheStore>>,
    vision: Arc<dyn ExchangeDataSource>,
    rest: Arc<dyn ExchangeDataSource>,
    fetch: Arc<FetchManager>,
}

impl DataManager {
    /// Build a manager with real HTTP sources.
    pub fn new(config: ManagerConfig) -> Result<Self, DataError> {
        let vision: Arc<dyn ExchangeDataSource> = Arc::new(VisionSource::new(
            &config.vision_base_url,
            config.request_timeout,
        ));
        let rest: Arc<dyn ExchangeDataSource> = Arc::new(RestSource::new(
            &config.rest_base_url,
            config.limits.rest_page_limit,
            config.request_timeout,
        ));
        Self::with_sources(config, vision, rest)
    }

    /// Build a manager over caller-supplied sources. The seam used by tests
    /// and by anyone wiring a different provider behind the same tiers.
    pub fn with_sources(
        config: ManagerConfig,
        vision: Arc<dyn ExchangeDataSource>,
        rest: Arc<dyn ExchangeDataSource>,
    ) -> Result<Self, DataError> {
        let cache = if config.caching_enabled {
            Some(Arc::new(CacheStore::open(&config.cache_dir)?))
        } else {
            None
        };
        let fetch = Arc::new(FetchManager::new(
            config.max_concurrency,
            config.retry.clone(),
            config.limits.weight_limit_per_minute,
            config.limits.kline_request_weight,
            config.limits.rest_page_limit,
            Duration::from_millis(config.limits.budget_wait_cap_ms),
        ));
        Ok(Self {
            config,
            cache,
            vision,
            rest,
            fetch,
        })
    }

    /// Retrieve a merged, deduplicated, gap-checked series for the request.
    pub async fn get_data(
        &self,
        request: &FetchRequest,
    ) -> Result<(Vec<Candle>, FetchReport), DataError> {
        self.get_data_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// [`get_data`](Self::get_data) with an externally owned cancellation
    /// signal. Cancellation returns an error promptly; already-resolved
    /// segments are discarded.
    pub async fn get_data_with_cancel(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Candle>, FetchReport), DataError> {
        let policy = request.source_policy;
        if policy == SourcePolicy::CacheOnly && self.cache.is_none() {
            return Err(DataError::Contradiction {
                policy,
                reason: "caching is disabled on this manager".to_string(),
            });
        }
        validate_request_shape(
            self.config.market_type,
            self.config.chart_type,
            request.interval,
        )?;

        let now_ms = Utc::now().timestamp_millis();
        let window = NormalizedWindow::normalize(request.window, request.interval, now_ms)?;
        let segments = window.day_segments();

        info!(
            event_type = "get_data_start",
            symbol = %request.symbol,
            interval = %request.interval,
            policy = %policy,
            segments = segments.len(),
            expected = window.expected_count(),
            "Resolving candle request"
        );

        let ctx = Arc::new(ResolveCtx {
            provider: self.config.provider,
            market_type: self.config.market_type,
            chart_type: self.config.chart_type,
            symbol: request.symbol.to_uppercase(),
            policy,
            vision_cutoff_ms: now_ms
                - i64::from(self.config.limits.vision_delay_hours) * 3_600_000,
            cache: self.cache.clone(),
            vision: Arc::clone(&self.vision),
            rest: Arc::clone(&self.rest),
            fetch: Arc::clone(&self.fetch),
        });

        let mut join_set = JoinSet::new();
        for segment in segments {
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            join_set.spawn(async move { resolve_segment(ctx, segment, cancel).await });
        }

        let mut resolutions = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(resolution) => resolutions.push(resolution),
                Err(e) => {
                    warn!(
                        event_type = "segment_task_failed",
                        error = %e,
                        "Segment task did not complete"
                    );
                }
            }
        }

        if cancel.is_cancelled()
            || resolutions
                .iter()
                .any(|r| matches!(r.kind, SegmentKind::Cancelled))
        {
            return Err(DataError::Cancelled);
        }

        let mut report = FetchReport::default();
        let mut batches = Vec::with_capacity(resolutions.len());
        for resolution in resolutions {
            if resolution.wrote_cache {
                report.cache_writes += 1;
            }
            match resolution.kind {
                SegmentKind::CacheHit(candles) => {
                    report.cache_hits += 1;
                    batches.push(candles);
                }
                SegmentKind::Vision(candles) => {
                    report.vision_segments += 1;
                    batches.push(candles);
                }
                SegmentKind::Rest(candles) => {
                    report.rest_segments += 1;
                    batches.push(candles);
                }
                SegmentKind::Empty => report.empty_segments += 1,
                SegmentKind::Failed { reason, attempts } => {
                    report.failed_segments.push(FailedSegment {
                        date: resolution.date,
                        reason,
                        attempts,
                    });
                }
                SegmentKind::Cancelled => {}
            }
        }

        let merged = merge_batches(batches);
        verify_series(&merged, &window)?;

        report.expected_count = window.expected_count();
        report.returned_count = merged.len();
        report.gaps = find_gaps(&merged, &window);
        report.integrity_faults = self
            .cache
            .as_ref()
            .map(|cache| cache.integrity_faults())
            .unwrap_or(0);

        info!(
            event_type = "get_data_complete",
            symbol = %request.symbol,
            returned = report.returned_count,
            cache_hits = report.cache_hits,
            vision_segments = report.vision_segments,
            rest_segments = report.rest_segments,
            gaps = report.gaps.len(),
            failed = report.failed_segments.len(),
            "Request resolved"
        );
        Ok((merged, report))
    }
}

/// Immutable context shared by every segment task of one request.
struct ResolveCtx {
    provider: Provider,
    market_type: MarketType,
    chart_type: ChartType,
    symbol: String,
    policy: SourcePolicy,
    vision_cutoff_ms: i64,
    cache: Option<Arc<CacheStore>>,
    vision: Arc<dyn ExchangeDataSource>,
    rest: Arc<dyn ExchangeDataSource>,
    fetch: Arc<FetchManager>,
}

enum SegmentKind {
    CacheHit(Vec<Candle>),
    Vision(Vec<Candle>),
    Rest(Vec<Candle>),
    Empty,
    Failed { reason: String, attempts: u32 },
    Cancelled,
}

struct SegmentResolution {
    date: NaiveDate,
    kind: SegmentKind,
    wrote_cache: bool,
}

impl ResolveCtx {
    fn key(&self, date: NaiveDate, interval: Interval) -> CacheKey {
        CacheKey::new(
            self.provider,
            self.market_type,
            self.chart_type,
            &self.symbol,
            interval,
            date,
        )
    }

    fn range_request(&self, window: NormalizedWindow) -> RangeRequest {
        RangeRequest {
            symbol: self.symbol.clone(),
            market_type: self.market_type,
            chart_type: self.chart_type,
            interval: window.interval,
            start_ms: window.start_ms,
            end_ms: window.end_ms,
        }
    }

    /// Whether the archive can be expected to have published this day.
    fn day_settled(&self, date: NaiveDate) -> bool {
        let day_end_ms = klinevault_core::utc_day_start_ms(date) + MS_PER_DAY;
        day_end_ms <= self.vision_cutoff_ms
    }

    /// Write a complete fetched day back to the cache. Anything short of a
    /// complete, aligned day is quietly not cached; that is the contract,
    /// not an error.
    fn try_cache(&self, date: NaiveDate, interval: Interval, candles: &[Candle]) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let key = self.key(date, interval);
        match cache.write(&key, candles) {
            Ok(_) => true,
            Err(
                e @ (CacheError::IncompleteDay { .. }
                | CacheError::MisalignedDay { .. }
                | CacheError::NotCacheable { .. }),
            ) => {
                debug!(
                    event_type = "cache_write_skipped",
                    key = %key,
                    reason = %e,
                    "Fetched day not cacheable"
                );
                false
            }
            Err(e) => {
                warn!(
                    event_type = "cache_write_failed",
                    key = %key,
                    error = %e,
                    "Failed to cache fetched day"
                );
                false
            }
        }
    }
}

fn clip_to_window(candles: Vec<Candle>, window: &NormalizedWindow) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| window.contains(c.open_time))
        .collect()
}

/// Resolve one day segment to a terminal state. Never propagates an error:
/// everything that can go wrong becomes a `Failed` or `Empty` resolution.
async fn resolve_segment(
    ctx: Arc<ResolveCtx>,
    segment: DaySegment,
    cancel: CancellationToken,
) -> SegmentResolution {
    let date = segment.date;
    let interval = segment.window.interval;

    // Cache consult, unless the policy forces a network tier.
    if matches!(ctx.policy, SourcePolicy::Auto | SourcePolicy::CacheOnly) {
        if let Some(cache) = &ctx.cache {
            let key = ctx.key(date, interval);
            if let Some(entry) = cache.lookup(&key) {
                match cache.read(&key, &entry, None) {
                    Ok(day) => {
                        return SegmentResolution {
                            date,
                            kind: SegmentKind::CacheHit(clip_to_window(day, &segment.window)),
                            wrote_cache: false,
                        };
                    }
                    Err(e) => {
                        // The read already invalidated the entry; treat as a
                        // miss and fall through to the network tiers.
                        warn!(
                            event_type = "cache_read_failed",
                            key = %key,
                            error = %e,
                            "Cache read failed, treating as miss"
                        );
                    }
                }
            }
        }
        if ctx.policy == SourcePolicy::CacheOnly {
            return SegmentResolution {
                date,
                kind: SegmentKind::Empty,
                wrote_cache: false,
            };
        }
    }

    // Bulk archive, for settled days of day-file granularity.
    let mut vision_failure: Option<(String, u32)> = None;
    let vision_eligible = matches!(ctx.policy, SourcePolicy::Auto | SourcePolicy::VisionOnly)
        && interval.is_day_cacheable()
        && ctx.day_settled(date);
    if vision_eligible {
        // The archive's unit is the whole day; fetch it all, cache it all,
        // return the requested slice.
        let full_day = segment.full_day_window();
        let request = ctx.range_request(full_day);
        match ctx
            .fetch
            .fetch_segment(ctx.vision.as_ref(), &request, &cancel)
            .await
        {
            SegmentOutcome::Fetched(day) => {
                let wrote_cache = ctx.try_cache(date, interval, &day);
                return SegmentResolution {
                    date,
                    kind: SegmentKind::Vision(clip_to_window(day, &segment.window)),
                    wrote_cache,
                };
            }
            SegmentOutcome::NoData => {
                debug!(
                    event_type = "vision_no_data",
                    date = %date,
                    "Archive has nothing for this day, falling back"
                );
            }
            SegmentOutcome::Failed { reason, attempts } => {
                vision_failure = Some((reason, attempts));
            }
            SegmentOutcome::Cancelled => {
                return SegmentResolution {
                    date,
                    kind: SegmentKind::Cancelled,
                    wrote_cache: false,
                };
            }
        }
    }
    if ctx.policy == SourcePolicy::VisionOnly {
        let kind = match vision_failure {
            Some((reason, attempts)) => SegmentKind::Failed { reason, attempts },
            None => SegmentKind::Empty,
        };
        return SegmentResolution {
            date,
            kind,
            wrote_cache: false,
        };
    }

    // Real-time API: recent days, and fallback for archive misses/failures.
    let request = ctx.range_request(segment.window);
    match ctx
        .fetch
        .fetch_segment(ctx.rest.as_ref(), &request, &cancel)
        .await
    {
        SegmentOutcome::Fetched(candles) => {
            let wrote_cache = segment.is_full_day() && ctx.try_cache(date, interval, &candles);
            SegmentResolution {
                date,
                kind: SegmentKind::Rest(candles),
                wrote_cache,
            }
        }
        SegmentOutcome::NoData => {
            let kind = match vision_failure {
                // Both tiers came up empty-handed but the archive failed
                // outright; surface that rather than a silent empty.
                Some((reason, attempts)) => SegmentKind::Failed { reason, attempts },
                None => SegmentKind::Empty,
            };
            SegmentResolution {
                date,
                kind,
                wrote_cache: false,
            }
        }
        SegmentOutcome::Failed { reason, attempts } => {
            let reason = match vision_failure {
                Some((vision_reason, _)) => {
                    format!("archive: {vision_reason}; real-time: {reason}")
                }
                None => reason,
            };
            SegmentResolution {
                date,
                kind: SegmentKind::Failed { reason, attempts },
                wrote_cache: false,
            }
        }
        SegmentOutcome::Cancelled => SegmentResolution {
            date,
            kind: SegmentKind::Cancelled,
            wrote_cache: false,
        },
    }
}
