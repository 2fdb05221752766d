//! Property tests for result aggregation.
//!
//! 1. The finished result does not depend on the order outcomes arrived in.
//! 2. Signals come back sorted by (date, ticker); the summary counts match.

use chrono::NaiveDate;
use proptest::prelude::*;
use renata_core::domain::{ParameterSet, Signal};
use renata_runner::{ResultAggregator, SkippedEvaluation};

const TICKERS: [&str; 5] = ["AAPL", "AMD", "NVDA", "TSLA", "ZM"];

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn signal(ticker: usize, d: u32) -> Signal {
    Signal {
        ticker: TICKERS[ticker].to_string(),
        date: day(d),
        values: [("gap_over_atr".to_string(), f64::from(d) / 10.0)]
            .into_iter()
            .collect(),
        params: ParameterSet::new().with("gap_over_atr", 0.1),
    }
}

fn skip(ticker: usize, d: Option<u32>) -> SkippedEvaluation {
    SkippedEvaluation {
        ticker: TICKERS[ticker].to_string(),
        date: d.map(day),
        reason: "data unavailable".into(),
    }
}

fn arb_signals() -> impl Strategy<Value = Vec<(usize, u32)>> {
    prop::collection::vec((0usize..TICKERS.len(), 2u32..20), 0..40)
}

fn arb_skips() -> impl Strategy<Value = Vec<(usize, Option<u32>)>> {
    prop::collection::vec((0usize..TICKERS.len(), prop::option::of(2u32..20)), 0..10)
}

fn finish(signals: &[(usize, u32)], skips: &[(usize, Option<u32>)]) -> renata_runner::ExecutionResult {
    let mut agg = ResultAggregator::new("OS D1", "f00d", day(2), day(19), TICKERS.len());
    agg.record_signals(signals.iter().map(|&(t, d)| signal(t, d)));
    for &(t, d) in skips {
        agg.record_skip(skip(t, d));
    }
    agg.finish()
}

proptest! {
    #[test]
    fn arrival_order_does_not_matter(signals in arb_signals(), skips in arb_skips()) {
        let forward = finish(&signals, &skips);
        let mut rev_signals = signals.clone();
        rev_signals.reverse();
        let mut rev_skips = skips.clone();
        rev_skips.reverse();
        prop_assert_eq!(forward, finish(&rev_signals, &rev_skips));
    }

    #[test]
    fn signals_are_sorted_and_counted(signals in arb_signals(), skips in arb_skips()) {
        let result = finish(&signals, &skips);
        prop_assert!(result
            .signals
            .windows(2)
            .all(|w| w[0].sort_key() <= w[1].sort_key()));
        prop_assert_eq!(result.summary.total_signals, signals.len());
        prop_assert_eq!(result.summary.skipped_evaluations, skips.len());
        prop_assert!(result.summary.tickers_skipped <= TICKERS.len());
    }
}
