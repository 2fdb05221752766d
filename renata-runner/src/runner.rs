//! Execution runner — runs a validated rule over tickers × dates.
//!
//! Two entry points:
//! - `execute()` / `execute_with_cancel()`: a generated rule plus a provider.
//! - `run_scan()`: a `ScanConfig`, resolving catalog, rule and provider. Used by the CLI.
//!
//! Per date the runner fetches the grouped snapshot, applies the universe
//! stage, evaluates the per-ticker stage for `tickers ∩ universe` on the
//! rayon pool, joins, and hands the outcomes to the aggregate stage. Per-ticker
//! failures become skips; they never abort the run.

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use renata_core::data::{CachingProvider, MarketDataProvider};
use renata_core::domain::{Bar, Timeframe};
use renata_core::indicators::IndicatorValues;
use renata_core::rules::{EvalError, MoldOutcome, TickerContext};
use renata_core::scanner::{
    validate, ComplianceReport, GenerateError, RuleDefinition, ScannerGenerator,
};

use crate::aggregate::{ExecutionResult, ResultAggregator, SkippedEvaluation};
use crate::config::{ConfigError, RunId, ScanConfig};

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("rule is not compliant: {}", describe(.0))]
    NonCompliantRule(ComplianceReport),

    #[error("invalid date range: end {end} precedes start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("timeframe {0} cannot be executed: the provider serves daily bars only")]
    UnsupportedTimeframe(Timeframe),

    #[error("a warmup of {warmup_bars} bars reaches before the earliest representable date from {start}")]
    WarmupOutOfRange { warmup_bars: usize, start: NaiveDate },
}

fn describe(report: &ComplianceReport) -> String {
    report
        .violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Errors from `run_scan`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("generation error: {0}")]
    Generate(#[from] GenerateError),
    #[error("execution error: {0}")]
    Execute(#[from] ExecuteError),
}

/// Cooperative cancellation shared between the caller and a running scan.
///
/// Once cancelled, no further dates are submitted; the date in flight
/// finishes and the result is flagged `cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Calendar days to reach back so that `bars` trading sessions precede the
/// first evaluated date, allowing for weekends and holidays. `None` on overflow.
pub fn warmup_calendar_days(bars: usize) -> Option<i64> {
    let bars = i64::try_from(bars).ok()?;
    bars.checked_mul(3)?.checked_div(2)?.checked_add(14)
}

/// First date of history to fetch for a run starting at `start`.
pub fn history_start(start: NaiveDate, warmup_bars: usize) -> Result<NaiveDate, ExecuteError> {
    warmup_calendar_days(warmup_bars)
        .and_then(Duration::try_days)
        .and_then(|days| start.checked_sub_signed(days))
        .ok_or(ExecuteError::WarmupOutOfRange { warmup_bars, start })
}

/// One ticker's loaded history and precomputed series.
struct LoadedTicker {
    bars: Vec<Bar>,
    indicators: IndicatorValues,
    index_by_date: HashMap<NaiveDate, usize>,
}

impl LoadedTicker {
    fn new(bars: Vec<Bar>, rule: &RuleDefinition) -> Self {
        let specs = rule
            .per_ticker()
            .map(|p| p.mold.required_series())
            .unwrap_or_default();
        let indicators = IndicatorValues::precompute(&bars, &specs);
        let index_by_date = bars.iter().enumerate().map(|(i, b)| (b.date, i)).collect();
        Self {
            bars,
            indicators,
            index_by_date,
        }
    }

    fn evaluate(
        &self,
        ticker: &str,
        date: NaiveDate,
        rule: &RuleDefinition,
    ) -> Result<MoldOutcome, EvalError> {
        let unavailable = || EvalError::DataUnavailable {
            ticker: ticker.to_string(),
            date,
        };
        let index = *self.index_by_date.get(&date).ok_or_else(unavailable)?;
        if self.bars[index].is_void() {
            return Err(unavailable());
        }
        let Some(per_ticker) = rule.per_ticker() else {
            return Ok(MoldOutcome::default());
        };
        let ctx = TickerContext {
            ticker,
            bars: &self.bars,
            indicators: &self.indicators,
        };
        per_ticker.mold.evaluate(&ctx, index, rule.params())
    }
}

/// Execute `rule` over `tickers` for every date in `start..=end`.
pub fn execute(
    rule: &RuleDefinition,
    provider: &dyn MarketDataProvider,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ExecutionResult, ExecuteError> {
    execute_with_cancel(rule, provider, tickers, start, end, &CancelToken::new())
}

pub fn execute_with_cancel(
    rule: &RuleDefinition,
    provider: &dyn MarketDataProvider,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
    cancel: &CancelToken,
) -> Result<ExecutionResult, ExecuteError> {
    let report = validate(rule);
    if !report.compliant {
        error!(
            setup = rule.setup(),
            fingerprint = %rule.fingerprint(),
            violations = %describe(&report),
            "refusing to execute non-compliant rule; generated rules must always pass validation"
        );
        return Err(ExecuteError::NonCompliantRule(report));
    }
    if rule.timeframe() != Timeframe::Daily {
        return Err(ExecuteError::UnsupportedTimeframe(rule.timeframe()));
    }
    if end < start {
        return Err(ExecuteError::InvalidDateRange { start, end });
    }

    let requested: Vec<String> = tickers
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut aggregator =
        ResultAggregator::new(rule.setup(), rule.fingerprint(), start, end, requested.len());

    // ── Phase 1: history + indicators, once per ticker ──
    let history_start = history_start(start, rule.warmup_bars())?;
    let loaded: Vec<(String, Result<LoadedTicker, String>)> = requested
        .par_iter()
        .map(|ticker| {
            let result = provider
                .fetch_ticker_history(ticker, history_start, end)
                .map(|bars| LoadedTicker::new(bars, rule))
                .map_err(|e| e.to_string());
            (ticker.clone(), result)
        })
        .collect();

    let mut contexts: HashMap<String, LoadedTicker> = HashMap::new();
    for (ticker, result) in loaded {
        match result {
            Ok(ctx) => {
                contexts.insert(ticker, ctx);
            }
            Err(reason) => {
                warn!(%ticker, %reason, "history unavailable, skipping ticker");
                aggregator.record_skip(SkippedEvaluation {
                    ticker,
                    date: None,
                    reason,
                });
            }
        }
    }
    info!(
        setup = rule.setup(),
        requested = requested.len(),
        loaded = contexts.len(),
        %history_start,
        "ticker histories loaded"
    );

    // ── Phase 2: dates ──
    let params = rule.params();
    for date in start.iter_days().take_while(|d| *d <= end) {
        if cancel.is_cancelled() {
            info!(%date, "scan cancelled");
            aggregator.mark_cancelled();
            break;
        }

        let snapshot = match provider.fetch_grouped_daily(date) {
            Ok(s) => s,
            Err(e) => {
                warn!(%date, error = %e, "grouped daily unavailable");
                aggregator.record_date_unavailable(date);
                continue;
            }
        };
        if snapshot.is_empty() {
            debug!(%date, "no market data, skipping date");
            continue;
        }
        aggregator.record_date_evaluated();

        // Stage 1: universe.
        let mut candidates: Vec<&str> = Vec::new();
        for ticker in &requested {
            let Some(bar) = snapshot.get(ticker) else {
                continue;
            };
            let admitted = match rule.universe() {
                Some(universe) => universe.admits(bar, params),
                None => Ok(true),
            };
            match admitted {
                Ok(true) => candidates.push(ticker),
                Ok(false) => {}
                Err(e) => aggregator.record_skip(SkippedEvaluation {
                    ticker: ticker.clone(),
                    date: Some(date),
                    reason: e.to_string(),
                }),
            }
        }

        // Stage 2: per-ticker, in parallel. Only loaded contexts are shared.
        let evaluated: Vec<(&str, Result<MoldOutcome, String>)> = candidates
            .par_iter()
            .map(|&ticker| {
                let outcome = match contexts.get(ticker) {
                    Some(ctx) => ctx.evaluate(ticker, date, rule).map_err(|e| e.to_string()),
                    None => Err("history was not loaded".to_string()),
                };
                (ticker, outcome)
            })
            .collect();

        let mut outcomes: Vec<(String, MoldOutcome)> = Vec::with_capacity(evaluated.len());
        for (ticker, outcome) in evaluated {
            match outcome {
                Ok(o) => outcomes.push((ticker.to_string(), o)),
                Err(reason) => {
                    // A ticker whose history failed is already recorded once.
                    if contexts.contains_key(ticker) {
                        debug!(%ticker, %date, %reason, "evaluation skipped");
                        aggregator.record_skip(SkippedEvaluation {
                            ticker: ticker.to_string(),
                            date: Some(date),
                            reason,
                        });
                    }
                }
            }
        }

        // Stage 3: aggregate.
        if let Some(aggregate) = rule.aggregate() {
            let signals = aggregate.aggregate(date, &outcomes, params);
            if !signals.is_empty() {
                debug!(%date, count = signals.len(), "signals emitted");
            }
            aggregator.record_signals(signals);
        }
    }

    let result = aggregator.finish();
    info!(setup = rule.setup(), summary = %result.summary, "scan finished");
    Ok(result)
}

/// Everything a scan produced, tagged with the config's run id.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub run_id: RunId,
    pub rule: RuleDefinition,
    pub result: ExecutionResult,
}

/// Resolve and run a configured scan.
pub fn run_scan(config: &ScanConfig, cancel: &CancelToken) -> Result<ScanReport, RunError> {
    let generator = ScannerGenerator::new(config.load_catalog()?);
    let rule = generator.generate_by_name(&config.setup, &config.params, config.timeframe)?;

    let history_start = history_start(config.start, rule.warmup_bars())?;
    let provider = CachingProvider::new(config.build_provider(history_start)?);
    info!(
        run_id = %config.run_id(),
        provider = provider.name(),
        setup = %config.setup,
        "starting scan"
    );

    let result = execute_with_cancel(
        &rule,
        &provider,
        &config.tickers,
        config.start,
        config.end,
        cancel,
    )?;
    Ok(ScanReport {
        run_id: config.run_id(),
        rule,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_days_cover_trading_sessions() {
        // 89 sessions need ~125 calendar days; leave room for holidays.
        assert!(warmup_calendar_days(89).unwrap() >= 140);
        assert_eq!(warmup_calendar_days(0), Some(14));
        assert_eq!(warmup_calendar_days(usize::MAX), None);
    }

    #[test]
    fn history_start_reports_unrepresentable_warmup() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            history_start(start, 20).unwrap(),
            NaiveDate::from_ymd_opt(2023, 11, 19).unwrap()
        );
        assert!(matches!(
            history_start(start, 100_000_000_000),
            Err(ExecuteError::WarmupOutOfRange { warmup_bars: 100_000_000_000, .. })
        ));
        assert!(history_start(start, usize::MAX).is_err());
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
