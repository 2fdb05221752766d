//! Result aggregation: collects signals and skips, then produces the
//! terminal `ExecutionResult`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use renata_core::domain::Signal;

/// Current schema version for exported results.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// A per-ticker failure that was isolated instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEvaluation {
    pub ticker: String,
    /// `None` when the ticker's history could not be loaded at all.
    pub date: Option<NaiveDate>,
    pub reason: String,
}

/// Summary counts reported with every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_signals: usize,
    /// Distinct tickers the scan was asked to evaluate.
    pub tickers_scanned: usize,
    /// Distinct tickers with at least one skipped evaluation.
    pub tickers_skipped: usize,
    pub skipped_evaluations: usize,
    /// Dates with a non-empty market snapshot.
    pub dates_evaluated: usize,
    /// Dates whose snapshot could not be fetched.
    pub dates_unavailable: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cancelled: bool,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} signal(s) found, {} ticker(s) scanned, {} ticker(s) skipped due to error \
             ({} evaluation(s)), {} date(s) evaluated from {} to {}",
            self.total_signals,
            self.tickers_scanned,
            self.tickers_skipped,
            self.skipped_evaluations,
            self.dates_evaluated,
            self.start,
            self.end
        )?;
        if self.dates_unavailable > 0 {
            write!(f, ", {} date(s) unavailable", self.dates_unavailable)?;
        }
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}

/// Terminal artifact of a scan. Signals are sorted by (date, ticker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub setup: String,
    pub rule_fingerprint: String,
    pub signals: Vec<Signal>,
    pub summary: ScanSummary,
    pub skipped: Vec<SkippedEvaluation>,
    pub unavailable_dates: Vec<NaiveDate>,
}

/// Accumulates per-date output during a run.
#[derive(Debug)]
pub struct ResultAggregator {
    setup: String,
    rule_fingerprint: String,
    start: NaiveDate,
    end: NaiveDate,
    tickers_scanned: usize,
    signals: Vec<Signal>,
    skipped: Vec<SkippedEvaluation>,
    dates_evaluated: usize,
    unavailable_dates: Vec<NaiveDate>,
    cancelled: bool,
}

impl ResultAggregator {
    pub fn new(
        setup: impl Into<String>,
        rule_fingerprint: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        tickers_scanned: usize,
    ) -> Self {
        Self {
            setup: setup.into(),
            rule_fingerprint: rule_fingerprint.into(),
            start,
            end,
            tickers_scanned,
            signals: Vec::new(),
            skipped: Vec::new(),
            dates_evaluated: 0,
            unavailable_dates: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record_signals(&mut self, signals: impl IntoIterator<Item = Signal>) {
        self.signals.extend(signals);
    }

    pub fn record_skip(&mut self, skip: SkippedEvaluation) {
        self.skipped.push(skip);
    }

    pub fn record_date_evaluated(&mut self) {
        self.dates_evaluated += 1;
    }

    pub fn record_date_unavailable(&mut self, date: NaiveDate) {
        self.unavailable_dates.push(date);
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Sort everything into its canonical order and compute the summary.
    pub fn finish(mut self) -> ExecutionResult {
        self.signals
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.skipped
            .sort_by(|a, b| (a.date, &a.ticker).cmp(&(b.date, &b.ticker)));
        self.unavailable_dates.sort();

        let tickers_skipped = self
            .skipped
            .iter()
            .map(|s| s.ticker.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let summary = ScanSummary {
            total_signals: self.signals.len(),
            tickers_scanned: self.tickers_scanned,
            tickers_skipped,
            skipped_evaluations: self.skipped.len(),
            dates_evaluated: self.dates_evaluated,
            dates_unavailable: self.unavailable_dates.len(),
            start: self.start,
            end: self.end,
            cancelled: self.cancelled,
        };

        ExecutionResult {
            schema_version: SCHEMA_VERSION,
            setup: self.setup,
            rule_fingerprint: self.rule_fingerprint,
            signals: self.signals,
            summary,
            skipped: self.skipped,
            unavailable_dates: self.unavailable_dates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renata_core::domain::ParameterSet;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn signal(ticker: &str, day: u32) -> Signal {
        Signal {
            ticker: ticker.into(),
            date: d(day),
            values: Default::default(),
            params: ParameterSet::new(),
        }
    }

    fn skip(ticker: &str, date: Option<NaiveDate>) -> SkippedEvaluation {
        SkippedEvaluation {
            ticker: ticker.into(),
            date,
            reason: "no data".into(),
        }
    }

    #[test]
    fn signals_are_sorted_by_date_then_ticker() {
        let mut agg = ResultAggregator::new("OS D1", "abc", d(2), d(5), 3);
        agg.record_signals([signal("TSLA", 4), signal("AAPL", 4), signal("NVDA", 2)]);
        let result = agg.finish();
        let keys: Vec<_> = result
            .signals
            .iter()
            .map(|s| (s.date, s.ticker.as_str()))
            .collect();
        assert_eq!(keys, vec![(d(2), "NVDA"), (d(4), "AAPL"), (d(4), "TSLA")]);
        assert_eq!(result.summary.total_signals, 3);
    }

    #[test]
    fn skipped_tickers_are_counted_once() {
        let mut agg = ResultAggregator::new("OS D1", "abc", d(2), d(5), 3);
        agg.record_skip(skip("GHOST", Some(d(3))));
        agg.record_skip(skip("GHOST", Some(d(2))));
        agg.record_skip(skip("VOID", None));
        let result = agg.finish();
        assert_eq!(result.summary.tickers_skipped, 2);
        assert_eq!(result.summary.skipped_evaluations, 3);
        assert_eq!(result.skipped[0].ticker, "VOID");
        assert_eq!(result.skipped[1].date, Some(d(2)));
    }

    #[test]
    fn summary_always_mentions_signals_and_skips() {
        let mut agg = ResultAggregator::new("OS D1", "abc", d(2), d(5), 2);
        agg.record_date_unavailable(d(3));
        agg.mark_cancelled();
        let text = agg.finish().summary.to_string();
        assert!(text.contains("0 signal(s) found"));
        assert!(text.contains("0 ticker(s) skipped"));
        assert!(text.contains("1 date(s) unavailable"));
        assert!(text.ends_with("[cancelled]"));
    }
}
