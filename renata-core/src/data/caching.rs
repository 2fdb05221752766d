//! Memoizing provider wrapper.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

use super::provider::{DataError, GroupedDaily, MarketDataProvider};
use crate::domain::Bar;

/// Wraps a provider and memoizes grouped-daily snapshots per date.
///
/// Errors are not memoized. Ticker history passes straight through; the
/// runner already fetches it once per ticker.
pub struct CachingProvider<P> {
    inner: P,
    grouped: Mutex<HashMap<NaiveDate, GroupedDaily>>,
}

impl<P: MarketDataProvider> CachingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            grouped: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn cached_dates(&self) -> usize {
        self.grouped.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl<P: MarketDataProvider> MarketDataProvider for CachingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch_grouped_daily(&self, date: NaiveDate) -> Result<GroupedDaily, DataError> {
        {
            let memo = self
                .grouped
                .lock()
                .map_err(|_| DataError::CacheError("grouped memo poisoned".into()))?;
            if let Some(hit) = memo.get(&date) {
                return Ok(hit.clone());
            }
        }
        // Fetch outside the lock; a concurrent miss on the same date costs
        // one duplicate request.
        let fetched = self.inner.fetch_grouped_daily(date)?;
        self.grouped
            .lock()
            .map_err(|_| DataError::CacheError("grouped memo poisoned".into()))?
            .insert(date, fetched.clone());
        Ok(fetched)
    }

    fn fetch_ticker_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        self.inner.fetch_ticker_history(ticker, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl MarketDataProvider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch_grouped_daily(&self, date: NaiveDate) -> Result<GroupedDaily, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if date.day0() == 0 {
                return Err(DataError::Other("first of month".into()));
            }
            Ok(GroupedDaily::new())
        }

        fn fetch_ticker_history(
            &self,
            ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Bar>, DataError> {
            Err(DataError::unavailable(ticker, "none"))
        }
    }

    #[test]
    fn memoizes_successful_snapshots_only() {
        let provider = CachingProvider::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let jan1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        provider.fetch_grouped_daily(jan2).unwrap();
        provider.fetch_grouped_daily(jan2).unwrap();
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);

        assert!(provider.fetch_grouped_daily(jan1).is_err());
        assert!(provider.fetch_grouped_daily(jan1).is_err());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.cached_dates(), 1);
    }
}
