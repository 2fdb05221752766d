//! Market data provider trait and structured error types.
//!
//! The trait abstracts over data sources (in-memory fixtures, synthetic
//! universes, the Parquet cache, an HTTP aggregates API) so the runner can be
//! exercised against any of them. Providers are configured explicitly through
//! their constructors; none read ambient global state.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::Bar;

/// All bars of one trading day, keyed by ticker.
pub type GroupedDaily = BTreeMap<String, Bar>;

/// Structured error types for data operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("data unavailable for '{ticker}': {reason}")]
    DataUnavailable { ticker: String, reason: String },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    pub fn unavailable(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }
}

/// Source of daily bars.
///
/// Bars returned for a date must be final for that date: no adjustment made
/// after the fact may leak into history the runner evaluates.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Every ticker's bar for `date`. A non-trading day yields an empty map.
    fn fetch_grouped_daily(&self, date: NaiveDate) -> Result<GroupedDaily, DataError>;

    /// Bars for `ticker` with `start <= date <= end`, sorted ascending.
    fn fetch_ticker_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError>;
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for &P {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_grouped_daily(&self, date: NaiveDate) -> Result<GroupedDaily, DataError> {
        (**self).fetch_grouped_daily(date)
    }

    fn fetch_ticker_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        (**self).fetch_ticker_history(ticker, start, end)
    }
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_grouped_daily(&self, date: NaiveDate) -> Result<GroupedDaily, DataError> {
        (**self).fetch_grouped_daily(date)
    }

    fn fetch_ticker_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        (**self).fetch_ticker_history(ticker, start, end)
    }
}
