//! In-memory provider over pre-loaded bars.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::provider::{DataError, GroupedDaily, MarketDataProvider};
use crate::domain::Bar;

/// Bars held in memory, keyed by ticker and sorted by date.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    name: String,
    bars: BTreeMap<String, Vec<Bar>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            name: "in_memory".into(),
            bars: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add (or replace) a ticker's bars. Bars are re-keyed to `ticker`
    /// and sorted; duplicate dates keep the last bar given.
    pub fn insert(&mut self, ticker: impl Into<String>, bars: Vec<Bar>) {
        let ticker = ticker.into();
        let mut by_date: BTreeMap<NaiveDate, Bar> = BTreeMap::new();
        for mut bar in bars {
            bar.ticker = ticker.clone();
            by_date.insert(bar.date, bar);
        }
        self.bars.insert(ticker, by_date.into_values().collect());
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.insert(ticker, bars);
        self
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }

    pub fn bars(&self, ticker: &str) -> Option<&[Bar]> {
        self.bars.get(ticker).map(Vec::as_slice)
    }
}

impl MarketDataProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_grouped_daily(&self, date: NaiveDate) -> Result<GroupedDaily, DataError> {
        Ok(self
            .bars
            .iter()
            .filter_map(|(ticker, bars)| {
                bars.binary_search_by_key(&date, |b| b.date)
                    .ok()
                    .map(|i| (ticker.clone(), bars[i].clone()))
            })
            .collect())
    }

    fn fetch_ticker_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        let bars = self
            .bars
            .get(ticker)
            .ok_or_else(|| DataError::unavailable(ticker, "ticker not loaded"))?;
        Ok(bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            ticker: String::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn grouped_daily_collects_each_tickers_bar() {
        let provider = InMemoryProvider::new()
            .with_ticker("AAPL", vec![bar(2, 10.0), bar(3, 11.0)])
            .with_ticker("TSLA", vec![bar(3, 20.0)]);
        let grouped = provider.fetch_grouped_daily(d(3)).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["TSLA"].close, 20.0);
        assert_eq!(grouped["AAPL"].ticker, "AAPL");
        assert!(provider.fetch_grouped_daily(d(6)).unwrap().is_empty());
    }

    #[test]
    fn history_is_range_filtered_and_sorted() {
        let provider =
            InMemoryProvider::new().with_ticker("AAPL", vec![bar(4, 12.0), bar(2, 10.0), bar(3, 11.0)]);
        let history = provider.fetch_ticker_history("AAPL", d(3), d(4)).unwrap();
        let dates: Vec<_> = history.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(3), d(4)]);
    }

    #[test]
    fn unknown_ticker_is_unavailable() {
        let provider = InMemoryProvider::new();
        assert!(matches!(
            provider.fetch_ticker_history("NOPE", d(2), d(3)),
            Err(DataError::DataUnavailable { .. })
        ));
    }
}
