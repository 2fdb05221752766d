//! Criterion benchmarks for scanner hot paths.
//!
//! 1. Indicator precompute for every series a built-in setup reads
//! 2. Mold evaluation across a full ticker history
//! 3. Rule generation + validation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use renata_core::domain::{Bar, ParameterSet, Timeframe};
use renata_core::indicators::IndicatorValues;
use renata_core::rules::TickerContext;
use renata_core::scanner::catalog::{CLOUD_EXTENSION, OS_D1};
use renata_core::scanner::{validate, RuleDefinition, ScannerGenerator};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = if i % 11 == 0 { close + 2.5 } else { close - 0.3 };
            Bar {
                ticker: "BENCH".into(),
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.5,
                low: open.min(close) - 1.5,
                close,
                volume: 1_000_000 + (i as u64 % 500_000),
            }
        })
        .collect()
}

fn rule(setup: &str) -> RuleDefinition {
    let params = ParameterSet::new()
        .with("gap_over_atr", 0.8)
        .with("vol_mult", 1.2)
        .with("dev_mult", 1.5);
    ScannerGenerator::default()
        .generate_by_name(setup, &params, Timeframe::Daily)
        .unwrap()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_precompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("precompute");
    for setup in [OS_D1, CLOUD_EXTENSION] {
        let specs = rule(setup).per_ticker().unwrap().mold.required_series();
        for n in [252usize, 2520] {
            let bars = make_bars(n);
            group.bench_with_input(BenchmarkId::new(setup, n), &bars, |b, bars| {
                b.iter(|| IndicatorValues::precompute(black_box(bars), &specs))
            });
        }
    }
    group.finish();
}

fn bench_mold_evaluation(c: &mut Criterion) {
    let rule = rule(OS_D1);
    let mold = &rule.per_ticker().unwrap().mold;
    let bars = make_bars(2520);
    let indicators = IndicatorValues::precompute(&bars, &mold.required_series());
    let ctx = TickerContext {
        ticker: "BENCH",
        bars: &bars,
        indicators: &indicators,
    };

    c.bench_function("mold_evaluate_2520_bars", |b| {
        b.iter(|| {
            (0..bars.len())
                .filter(|&i| mold.evaluate(&ctx, i, rule.params()).map_or(false, |o| o.matched))
                .count()
        })
    });
}

fn bench_generate_validate(c: &mut Criterion) {
    c.bench_function("generate_and_validate_os_d1", |b| {
        b.iter(|| validate(&rule(black_box(OS_D1))))
    });
}

criterion_group!(
    benches,
    bench_precompute,
    bench_mold_evaluation,
    bench_generate_validate
);
criterion_main!(benches);
