//! End-to-end failover behavior over scripted sources
//!
//! Exercises the full chain - normalization, day segmentation, cache
//! consult, archive/real-time dispatch, write-back, merge, report - with
//! deterministic mock sources and a real on-disk cache.

mod common;

use chrono::{NaiveDate, Utc};
use common::*;
use klinevault::core::utc_day_of;
use klinevault::{
    CandleSource, DataError, DataManager, FetchRequest, Interval, RangeRequest, SourceError,
    SourcePolicy, SourceTier, TimeWindow,
};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

const JAN1: i64 = 1_704_067_200_000; // 2024-01-01 00:00:00 UTC
const DAY: i64 = 86_400_000;

fn day_request(policy: SourcePolicy) -> FetchRequest {
    FetchRequest {
        symbol: "BTCUSDT".to_string(),
        interval: Interval::M1,
        window: TimeWindow::new(JAN1, JAN1 + DAY - 60_000),
        source_policy: policy,
    }
}

#[tokio::test]
async fn settled_day_comes_from_the_archive_and_populates_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let (vision, vision_calls) = MockSource::serving(SourceTier::Vision);
    let (rest, rest_calls) = MockSource::serving(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();

    let (candles, report) = manager.get_data(&day_request(SourcePolicy::Auto)).await.unwrap();

    assert_eq!(candles.len(), 1440);
    assert_eq!(report.expected_count, 1440);
    assert_eq!(report.returned_count, 1440);
    assert!(candles.iter().all(|c| c.source == CandleSource::Vision));
    assert_eq!(report.vision_segments, 1);
    assert_eq!(report.cache_hits, 0);
    assert_eq!(report.cache_writes, 1);
    assert!(report.gaps.is_empty());
    assert!(report.failed_segments.is_empty());
    assert_eq!(vision_calls.load(Ordering::SeqCst), 1);
    assert_eq!(rest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeat_request_is_served_entirely_from_cache_with_identical_values() {
    let dir = tempfile::tempdir().unwrap();
    let (vision, vision_calls) = MockSource::serving(SourceTier::Vision);
    let (rest, rest_calls) = MockSource::serving(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();
    let request = day_request(SourcePolicy::Auto);

    let (first, _) = manager.get_data(&request).await.unwrap();
    let (second, report) = manager.get_data(&request).await.unwrap();

    assert_eq!(report.cache_hits, 1);
    assert_eq!(report.vision_segments, 0);
    assert_eq!(report.rest_segments, 0);
    assert_eq!(report.cache_writes, 0);
    // Zero additional network calls on the repeat.
    assert_eq!(vision_calls.load(Ordering::SeqCst), 1);
    assert_eq!(rest_calls.load(Ordering::SeqCst), 0);

    assert_eq!(second.len(), first.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.open_time, b.open_time);
        assert_eq!(a.open.to_bits(), b.open.to_bits());
        assert_eq!(a.high.to_bits(), b.high.to_bits());
        assert_eq!(a.low.to_bits(), b.low.to_bits());
        assert_eq!(a.close.to_bits(), b.close.to_bits());
        assert_eq!(a.volume.to_bits(), b.volume.to_bits());
        assert_eq!(a.quote_volume.to_bits(), b.quote_volume.to_bits());
        assert_eq!(a.trade_count, b.trade_count);
        assert_eq!(b.source, CandleSource::Cache);
    }
}

#[tokio::test]
async fn recent_window_is_served_by_the_real_time_tier_and_never_cached() {
    let dir = tempfile::tempdir().unwrap();
    let (vision, vision_calls) = MockSource::serving(SourceTier::Vision);
    let (rest, rest_calls) = MockSource::serving(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();

    let now = Utc::now().timestamp_millis();
    let request = FetchRequest {
        symbol: "BTCUSDT".to_string(),
        interval: Interval::M1,
        window: TimeWindow::new(now - 3_600_000, now - 120_000),
        source_policy: SourcePolicy::Auto,
    };

    let (candles, report) = manager.get_data(&request).await.unwrap();

    assert!(!candles.is_empty());
    assert!(candles.iter().all(|c| c.source == CandleSource::Rest));
    assert_eq!(report.vision_segments, 0);
    assert_eq!(report.cache_hits, 0);
    // The current day is never a complete day, so nothing is cached.
    assert_eq!(report.cache_writes, 0);
    assert_eq!(vision_calls.load(Ordering::SeqCst), 0);
    assert!(rest_calls.load(Ordering::SeqCst) >= 1);
    assert!(report.gaps.is_empty());
}

#[tokio::test]
async fn one_poisoned_day_becomes_one_gap_and_spares_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let poisoned = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

    let (vision, _) = MockSource::new(
        SourceTier::Vision,
        Box::new(move |req: &RangeRequest| {
            if utc_day_of(req.start_ms) == poisoned {
                Err(SourceError::Fatal {
                    reason: "archive checksum mismatch".to_string(),
                })
            } else {
                Ok(synth_candles(req, CandleSource::Vision))
            }
        }),
    );
    let (rest, rest_calls) = MockSource::not_found(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();

    // Three settled days at 1h: 72 expected candles.
    let request = FetchRequest {
        symbol: "BTCUSDT".to_string(),
        interval: Interval::H1,
        window: TimeWindow::new(JAN1, JAN1 + 3 * DAY - 3_600_000),
        source_policy: SourcePolicy::Auto,
    };

    let (candles, report) = manager.get_data(&request).await.unwrap();

    // The other two days survive in full.
    assert_eq!(candles.len(), 48);
    assert_eq!(report.vision_segments, 2);
    assert_eq!(report.failed_segments.len(), 1);
    assert_eq!(report.failed_segments[0].date, poisoned);
    assert!(report.failed_segments[0].reason.contains("checksum"));
    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].missing, 24);
    // The failed day fell back to the real-time tier before giving up.
    assert_eq!(rest_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn archive_miss_falls_back_to_the_real_time_tier() {
    let dir = tempfile::tempdir().unwrap();
    let (vision, vision_calls) = MockSource::not_found(SourceTier::Vision);
    let (rest, rest_calls) = MockSource::serving(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();

    let (candles, report) = manager.get_data(&day_request(SourcePolicy::Auto)).await.unwrap();

    assert_eq!(candles.len(), 1440);
    assert!(candles.iter().all(|c| c.source == CandleSource::Rest));
    assert_eq!(report.rest_segments, 1);
    // A complete day fetched over the real-time tier is still cacheable.
    assert_eq!(report.cache_writes, 1);
    assert_eq!(vision_calls.load(Ordering::SeqCst), 1);
    assert_eq!(rest_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_archive_failures_are_retried_through() {
    let dir = tempfile::tempdir().unwrap();
    let (vision, vision_calls) = {
        let flaky = std::sync::atomic::AtomicUsize::new(0);
        MockSource::new(
            SourceTier::Vision,
            Box::new(move |req: &RangeRequest| {
                if flaky.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SourceError::Retryable {
                        reason: "HTTP 503".to_string(),
                    })
                } else {
                    Ok(synth_candles(req, CandleSource::Vision))
                }
            }),
        )
    };
    let (rest, rest_calls) = MockSource::serving(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();

    let (candles, report) = manager.get_data(&day_request(SourcePolicy::Auto)).await.unwrap();

    assert_eq!(candles.len(), 1440);
    assert_eq!(report.vision_segments, 1);
    assert_eq!(vision_calls.load(Ordering::SeqCst), 3);
    assert_eq!(rest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_propagates_as_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (vision, _) = MockSource::serving(SourceTier::Vision);
    let (rest, _) = MockSource::serving(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = manager
        .get_data_with_cancel(&day_request(SourcePolicy::Auto), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Cancelled));
}

#[tokio::test]
async fn corrupted_cache_file_heals_through_refetch() {
    let dir = tempfile::tempdir().unwrap();
    let (vision, vision_calls) = MockSource::serving(SourceTier::Vision);
    let (rest, _) = MockSource::serving(SourceTier::Rest);
    let manager =
        DataManager::with_sources(manager_config(dir.path(), true), vision, rest).unwrap();
    let request = day_request(SourcePolicy::Auto);

    manager.get_data(&request).await.unwrap();
    assert_eq!(vision_calls.load(Ordering::SeqCst), 1);

    // Corrupt the day file behind the manager's back.
    let day_file = dir
        .path()
        .join("cache/binance/futures/um/klines/BTCUSDT/1m/BTCUSDT-1m-2024-01-01.ipc");
    assert!(day_file.exists(), "cache file expected at {day_file:?}");
    std::fs::write(&day_file, b"garbage").unwrap();

    let (candles, report) = manager.get_data(&request).await.unwrap();

    // The checksum mismatch reads as a miss, the archive refills the cache.
    assert_eq!(candles.len(), 1440);
    assert_eq!(report.cache_hits, 0);
    assert_eq!(report.vision_segments, 1);
    assert_eq!(report.cache_writes, 1);
    assert!(report.integrity_faults >= 1);
    assert_eq!(vision_calls.load(Ordering::SeqCst), 2);

    // And the heal sticks.
    let (_, third) = manager.get_data(&request).await.unwrap();
    assert_eq!(third.cache_hits, 1);
    assert_eq!(vision_calls.load(Ordering::SeqCst), 2);
}
