//! Bounded-concurrency segment fetching
//!
//! One segment attempt moves through an explicit machine:
//!
//! ```text
//! PENDING -> IN_FLIGHT -> SUCCESS        (candles returned)
//!                      -> NOT_FOUND      (terminal, legitimately empty)
//!                      -> RETRYABLE ----> backoff, re-enter PENDING
//!                      -> FATAL          (terminal, per-segment only)
//! ```
//!
//! A denied rate-budget reservation re-enters PENDING after sleeping on the
//! hint and is charged against the same retry budget as a network failure.
//! Every sleep races the cancellation token, so shutdown is never delayed by
//! a backoff.

use klinevault_core::Candle;
use klinevault_providers::{ExchangeDataSource, RangeRequest, SourceError, SourceTier};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::budget::{RateBudget, Reservation};
use crate::retry::RetryPolicy;

/// Hard ceiling on the worker pool, whatever the configuration says.
pub const MAX_CONCURRENT_FETCHES: usize = 100;

/// Terminal states of one segment fetch.
#[derive(Debug)]
pub enum SegmentOutcome {
    /// The source returned data for the slice.
    Fetched(Vec<Candle>),

    /// The source has no data for the slice. Not a failure: the segment
    /// resolves to an empty result.
    NoData,

    /// Retries exhausted or a fatal source error. Scoped to this segment;
    /// other segments are unaffected.
    Failed { reason: String, attempts: u32 },

    /// The request was cancelled while this segment was pending or in
    /// flight.
    Cancelled,
}

/// Issues source fetches with bounded concurrency, retry and rate budgeting.
pub struct FetchManager {
    semaphore: Semaphore,
    budget: Mutex<RateBudget>,
    retry: RetryPolicy,
    kline_request_weight: u32,
    rest_page_limit: u32,
    budget_wait_cap: Duration,
}

impl FetchManager {
    pub fn new(
        max_concurrency: usize,
        retry: RetryPolicy,
        weight_limit_per_minute: u32,
        kline_request_weight: u32,
        rest_page_limit: u32,
        budget_wait_cap: Duration,
    ) -> Self {
        let permits = max_concurrency.clamp(1, MAX_CONCURRENT_FETCHES);
        Self {
            semaphore: Semaphore::new(permits),
            budget: Mutex::new(RateBudget::new(weight_limit_per_minute)),
            retry,
            kline_request_weight: kline_request_weight.max(1),
            rest_page_limit: rest_page_limit.max(1),
            budget_wait_cap,
        }
    }

    /// Static weight estimate for a real-time fetch: pages needed at the
    /// configured page size, each at the configured per-request weight.
    /// Deliberately not measured from live response headers, so budgeting
    /// stays deterministic.
    pub fn estimated_weight(&self, request: &RangeRequest) -> u32 {
        let width = request.interval.duration_ms().max(1);
        let rows = ((request.end_ms - request.start_ms) / width + 1).max(1) as u64;
        let pages = rows.div_ceil(self.rest_page_limit as u64).max(1);
        (pages as u32).saturating_mul(self.kline_request_weight)
    }

    /// Run one segment fetch to a terminal state.
    pub async fn fetch_segment(
        &self,
        source: &dyn ExchangeDataSource,
        request: &RangeRequest,
        cancel: &CancellationToken,
    ) -> SegmentOutcome {
        let _permit = tokio::select! {
            permit = self.semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return SegmentOutcome::Cancelled,
            },
            _ = cancel.cancelled() => return SegmentOutcome::Cancelled,
        };

        let mut attempts: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return SegmentOutcome::Cancelled;
            }

            // PENDING: the real-time tier must clear the weight budget first.
            if source.tier() == SourceTier::Rest {
                let weight = self.estimated_weight(request);
                let reservation = self.budget.lock().reserve(weight, Instant::now());
                if let Reservation::Denied { retry_after } = reservation {
                    attempts += 1;
                    if attempts > self.retry.max_retries {
                        return SegmentOutcome::Failed {
                            reason: "rate budget exhausted".to_string(),
                            attempts,
                        };
                    }
                    let wait = retry_after.min(self.budget_wait_cap);
                    debug!(
                        event_type = "budget_denied",
                        symbol = %request.symbol,
                        weight,
                        wait_ms = wait.as_millis() as u64,
                        attempts,
                        "Weight budget denied, waiting for the window"
                    );
                    if !self.sleep_unless_cancelled(wait, cancel).await {
                        return SegmentOutcome::Cancelled;
                    }
                    continue;
                }
            }

            // IN_FLIGHT
            let result = tokio::select! {
                result = source.fetch_range(request) => result,
                _ = cancel.cancelled() => return SegmentOutcome::Cancelled,
            };

            match result {
                Ok(candles) if candles.is_empty() => return SegmentOutcome::NoData,
                Ok(candles) => return SegmentOutcome::Fetched(candles),
                Err(SourceError::NotFound) => return SegmentOutcome::NoData,
                Err(SourceError::Retryable { reason }) => {
                    attempts += 1;
                    if attempts > self.retry.max_retries {
                        warn!(
                            event_type = "segment_retries_exhausted",
                            tier = %source.tier(),
                            symbol = %request.symbol,
                            attempts,
                            reason = %reason,
                            "Retries exhausted, segment fails"
                        );
                        return SegmentOutcome::Failed { reason, attempts };
                    }
                    let delay = self.retry.backoff_delay(attempts);
                    debug!(
                        event_type = "segment_backoff",
                        tier = %source.tier(),
                        symbol = %request.symbol,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Transient failure, backing off"
                    );
                    if !self.sleep_unless_cancelled(delay, cancel).await {
                        return SegmentOutcome::Cancelled;
                    }
                }
                Err(SourceError::Fatal { reason }) => {
                    warn!(
                        event_type = "segment_fatal",
                        tier = %source.tier(),
                        symbol = %request.symbol,
                        reason = %reason,
                        "Fatal source failure, segment fails"
                    );
                    return SegmentOutcome::Failed {
                        reason,
                        attempts: attempts + 1,
                    };
                }
            }
        }
    }

    /// Returns false if cancellation won the race.
    async fn sleep_unless_cancelled(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}
