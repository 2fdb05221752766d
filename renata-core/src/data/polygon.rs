//! Polygon-style aggregates HTTP provider.
//!
//! Reads the grouped-daily endpoint (every US stock for one date) and the
//! per-ticker daily range endpoint. Handles retries with exponential backoff,
//! rate limiting and the circuit breaker. The API key is passed in explicitly.

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, GroupedDaily, MarketDataProvider};
use crate::domain::Bar;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Connection settings for [`PolygonProvider`].
#[derive(Debug, Clone)]
pub struct PolygonConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl PolygonConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AggsResponse {
    status: Option<String>,
    #[serde(default)]
    results: Option<Vec<AggBar>>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    /// Only present on grouped-daily rows.
    #[serde(rename = "T")]
    ticker: Option<String>,
    #[serde(rename = "o")]
    open: Option<f64>,
    #[serde(rename = "h")]
    high: Option<f64>,
    #[serde(rename = "l")]
    low: Option<f64>,
    #[serde(rename = "c")]
    close: Option<f64>,
    #[serde(rename = "v")]
    volume: Option<f64>,
    /// Unix milliseconds at the start of the aggregate window.
    #[serde(rename = "t")]
    timestamp_ms: i64,
}

impl AggBar {
    fn into_bar(self, ticker: String) -> Result<Bar, DataError> {
        let date = chrono::DateTime::from_timestamp_millis(self.timestamp_ms)
            .map(|dt| dt.naive_utc().date())
            .ok_or_else(|| {
                DataError::ResponseFormatChanged(format!(
                    "invalid timestamp: {}",
                    self.timestamp_ms
                ))
            })?;
        Ok(Bar {
            ticker,
            date,
            open: self.open.unwrap_or(f64::NAN),
            high: self.high.unwrap_or(f64::NAN),
            low: self.low.unwrap_or(f64::NAN),
            close: self.close.unwrap_or(f64::NAN),
            volume: self.volume.map(|v| v.max(0.0).round() as u64).unwrap_or(0),
        })
    }
}

fn check_status(resp: &AggsResponse) -> Result<(), DataError> {
    match resp.status.as_deref() {
        Some("OK") | Some("DELAYED") => Ok(()),
        Some("NOT_AUTHORIZED") => Err(DataError::AuthenticationRequired(
            resp.message.clone().unwrap_or_default(),
        )),
        other => Err(DataError::ResponseFormatChanged(format!(
            "unexpected status {:?}: {}",
            other,
            resp.error
                .as_deref()
                .or(resp.message.as_deref())
                .unwrap_or("no message")
        ))),
    }
}

/// Parse a grouped-daily body. Rows for other dates are dropped.
fn parse_grouped(body: &str, date: NaiveDate) -> Result<GroupedDaily, DataError> {
    let resp: AggsResponse = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("grouped daily: {e}")))?;
    check_status(&resp)?;

    let mut grouped = GroupedDaily::new();
    for row in resp.results.unwrap_or_default() {
        let Some(ticker) = row.ticker.clone() else {
            return Err(DataError::ResponseFormatChanged(
                "grouped row without ticker".into(),
            ));
        };
        let bar = row.into_bar(ticker.clone())?;
        if bar.date == date {
            grouped.insert(ticker, bar);
        }
    }
    Ok(grouped)
}

/// Parse a per-ticker range body into date-sorted bars.
fn parse_history(body: &str, ticker: &str) -> Result<Vec<Bar>, DataError> {
    let resp: AggsResponse = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("{ticker} history: {e}")))?;
    check_status(&resp)?;

    let mut bars = resp
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|row| row.into_bar(ticker.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    if bars.is_empty() {
        return Err(DataError::unavailable(ticker, "no aggregates returned"));
    }
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

// ── Provider ────────────────────────────────────────────────────────

pub struct PolygonProvider {
    client: reqwest::blocking::Client,
    config: PolygonConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl PolygonProvider {
    pub fn new(config: PolygonConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        if config.api_key.trim().is_empty() {
            return Err(DataError::AuthenticationRequired("empty API key".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("renata-scanner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            circuit_breaker,
        })
    }

    fn grouped_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/grouped/locale/us/market/stocks/{date}?adjusted=true",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn range_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{ticker}/range/1/day/{start}/{end}?adjusted=true&sort=asc&limit=50000",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// GET `url` with retry and circuit breaker logic, returning the body.
    fn get_with_retry(&self, url: &str, what: &str) -> Result<String, DataError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.config.base_delay * 2u32.pow(attempt - 1));
            }
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let resp = match self
                .client
                .get(url)
                .bearer_auth(&self.config.api_key)
                .send()
            {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(what, attempt, error = %e, "request failed, retrying");
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                tracing::error!(what, "provider returned 403, circuit breaker tripped");
                return Err(DataError::CircuitBreakerTripped);
            }
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(DataError::AuthenticationRequired(format!(
                    "HTTP 401 for {what}"
                )));
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DataError::unavailable(what, "HTTP 404"));
            }
            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Other(format!("HTTP {status} for {what}")));
                continue;
            }

            let body = resp
                .text()
                .map_err(|e| DataError::NetworkUnreachable(format!("{what}: {e}")))?;
            self.circuit_breaker.record_success();
            return Ok(body);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl MarketDataProvider for PolygonProvider {
    fn name(&self) -> &str {
        "polygon"
    }

    fn fetch_grouped_daily(&self, date: NaiveDate) -> Result<GroupedDaily, DataError> {
        let body = self.get_with_retry(&self.grouped_url(date), &format!("grouped {date}"))?;
        let grouped = parse_grouped(&body, date)?;
        tracing::debug!(%date, tickers = grouped.len(), "fetched grouped daily");
        Ok(grouped)
    }

    fn fetch_ticker_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        let body = self.get_with_retry(&self.range_url(ticker, start, end), ticker)?;
        let bars = parse_history(&body, ticker)?;
        tracing::debug!(ticker, bars = bars.len(), "fetched ticker history");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-03T05:00:00Z
    const JAN3_MS: i64 = 1_704_258_000_000;
    // 2024-01-02T05:00:00Z
    const JAN2_MS: i64 = 1_704_171_600_000;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn parses_grouped_daily() {
        let body = format!(
            r#"{{"status":"OK","resultsCount":2,"results":[
                {{"T":"AAPL","o":187.15,"h":188.44,"l":183.89,"c":184.25,"v":58414460.0,"t":{JAN3_MS}}},
                {{"T":"TSLA","o":244.0,"h":245.6,"l":236.3,"c":238.45,"v":121082600,"t":{JAN3_MS}}}
            ]}}"#
        );
        let grouped = parse_grouped(&body, d(3)).unwrap();
        assert_eq!(grouped.len(), 2);
        let aapl = &grouped["AAPL"];
        assert_eq!(aapl.ticker, "AAPL");
        assert_eq!(aapl.date, d(3));
        assert_eq!(aapl.open, 187.15);
        assert_eq!(aapl.volume, 58_414_460);
    }

    #[test]
    fn empty_grouped_day_is_not_an_error() {
        let body = r#"{"status":"OK","resultsCount":0}"#;
        assert!(parse_grouped(body, d(1)).unwrap().is_empty());
    }

    #[test]
    fn parses_and_sorts_history() {
        let body = format!(
            r#"{{"ticker":"AAPL","status":"OK","results":[
                {{"o":2.0,"h":3.0,"l":1.0,"c":2.5,"v":10,"t":{JAN3_MS}}},
                {{"o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":20,"t":{JAN2_MS}}}
            ]}}"#
        );
        let bars = parse_history(&body, "AAPL").unwrap();
        let dates: Vec<_> = bars.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(2), d(3)]);
        assert_eq!(bars[0].ticker, "AAPL");
    }

    #[test]
    fn empty_history_is_unavailable() {
        let body = r#"{"ticker":"ZZZZ","status":"OK","results":[]}"#;
        assert!(matches!(
            parse_history(body, "ZZZZ"),
            Err(DataError::DataUnavailable { .. })
        ));
    }

    #[test]
    fn error_status_is_format_change() {
        let body = r#"{"status":"ERROR","error":"bad request"}"#;
        assert!(matches!(
            parse_history(body, "AAPL"),
            Err(DataError::ResponseFormatChanged(msg)) if msg.contains("bad request")
        ));
        let body = r#"{"status":"NOT_AUTHORIZED","message":"plan"}"#;
        assert!(matches!(
            parse_grouped(body, d(3)),
            Err(DataError::AuthenticationRequired(_))
        ));
    }

    #[test]
    fn rejects_empty_api_key() {
        let result = PolygonProvider::new(
            PolygonConfig::new("  "),
            Arc::new(CircuitBreaker::default_provider()),
        );
        assert!(matches!(result, Err(DataError::AuthenticationRequired(_))));
    }

    #[test]
    fn builds_endpoint_urls() {
        let mut config = PolygonConfig::new("key");
        config.base_url = "http://localhost:9/".into();
        let provider =
            PolygonProvider::new(config, Arc::new(CircuitBreaker::default_provider())).unwrap();
        assert_eq!(
            provider.grouped_url(d(3)),
            "http://localhost:9/v2/aggs/grouped/locale/us/market/stocks/2024-01-03?adjusted=true"
        );
        assert!(provider
            .range_url("AAPL", d(2), d(3))
            .starts_with("http://localhost:9/v2/aggs/ticker/AAPL/range/1/day/2024-01-02/2024-01-03"));
    }
}
