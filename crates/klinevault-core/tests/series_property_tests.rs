//! Property tests for series assembly invariants
//!
//! Whatever mix of overlapping segment batches the merge receives, the
//! output must be strictly increasing, unique, and aligned.

use klinevault_core::{
    find_gaps, merge_batches, verify_series, Candle, CandleSource, Interval, NormalizedWindow,
    TimeWindow,
};
use proptest::prelude::*;

const JAN1: i64 = 1_704_067_200_000; // 2024-01-01 00:00:00 UTC
const SLOTS: i64 = 240;

fn candle_at(slot: i64, source: CandleSource) -> Candle {
    let open_time = JAN1 + slot * 60_000;
    Candle {
        open_time,
        open: 100.0,
        high: 101.0,
        low: 99.0,
        close: 100.5,
        volume: 1.0,
        close_time: open_time + 59_999,
        quote_volume: 100.5,
        trade_count: 7,
        taker_buy_volume: 0.4,
        taker_buy_quote_volume: 40.0,
        source,
    }
}

fn window() -> NormalizedWindow {
    NormalizedWindow::normalize(
        TimeWindow::new(JAN1, JAN1 + (SLOTS - 1) * 60_000),
        Interval::M1,
        i64::MAX,
    )
    .expect("static window must normalize")
}

fn source_strategy() -> impl Strategy<Value = CandleSource> {
    prop_oneof![
        Just(CandleSource::Cache),
        Just(CandleSource::Vision),
        Just(CandleSource::Rest),
    ]
}

fn batch_strategy() -> impl Strategy<Value = Vec<Candle>> {
    proptest::collection::vec((0..SLOTS, source_strategy()), 0..200)
        .prop_map(|slots| slots.into_iter().map(|(s, src)| candle_at(s, src)).collect())
}

proptest! {
    #[test]
    fn merged_series_upholds_the_invariant(batches in proptest::collection::vec(batch_strategy(), 1..6)) {
        let merged = merge_batches(batches);
        let window = window();
        prop_assert!(verify_series(&merged, &window).is_ok());
    }

    #[test]
    fn gaps_and_series_partition_the_window(batches in proptest::collection::vec(batch_strategy(), 1..6)) {
        let window = window();
        let merged = merge_batches(batches);
        let gaps = find_gaps(&merged, &window);
        let missing: u64 = gaps.iter().map(|g| g.missing).sum();
        prop_assert_eq!(merged.len() as u64 + missing, window.expected_count());
    }

    #[test]
    fn duplicate_slots_resolve_to_highest_priority(slot in 0..SLOTS) {
        let merged = merge_batches(vec![
            vec![candle_at(slot, CandleSource::Rest)],
            vec![candle_at(slot, CandleSource::Vision)],
            vec![candle_at(slot, CandleSource::Cache)],
        ]);
        prop_assert_eq!(merged.len(), 1);
        prop_assert_eq!(merged[0].source, CandleSource::Cache);
    }
}
