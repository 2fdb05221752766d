//! Seeded synthetic bar generation.
//!
//! Each ticker draws from its own `StdRng` whose seed is derived from the
//! master seed and the ticker name via BLAKE3, so a ticker's series does not
//! depend on which other tickers are generated or in what order. Weekends are
//! skipped; occasional opening gaps with volume spikes give gap setups
//! something to find.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::memory::InMemoryProvider;
use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_start_price")]
    pub start_price: f64,
    /// Standard deviation scale of daily close-to-close returns.
    #[serde(default = "default_daily_vol")]
    pub daily_vol: f64,
    /// Probability that a session opens with a large gap up.
    #[serde(default = "default_gap_probability")]
    pub gap_probability: f64,
    #[serde(default = "default_base_volume")]
    pub base_volume: u64,
}

fn default_start_price() -> f64 {
    50.0
}

fn default_daily_vol() -> f64 {
    0.02
}

fn default_gap_probability() -> f64 {
    0.02
}

fn default_base_volume() -> u64 {
    1_000_000
}

impl SyntheticConfig {
    pub fn new(seed: u64, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            seed,
            start,
            end,
            start_price: default_start_price(),
            daily_vol: default_daily_vol(),
            gap_probability: default_gap_probability(),
            base_volume: default_base_volume(),
        }
    }

    fn ticker_seed(&self, ticker: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(ticker.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Generate one ticker's weekday bars between `config.start` and `config.end`.
pub fn generate_bars(config: &SyntheticConfig, ticker: &str) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(config.ticker_seed(ticker));
    let mut prev_close = config.start_price * rng.gen_range(0.5..2.0);
    let mut bars = Vec::new();

    for date in config.start.iter_days().take_while(|d| *d <= config.end) {
        if !is_weekday(date) {
            continue;
        }

        let gapped = rng.gen_bool(config.gap_probability.clamp(0.0, 1.0));
        let gap = if gapped {
            rng.gen_range(0.04..0.12)
        } else {
            rng.gen_range(-0.3..0.3) * config.daily_vol
        };
        let open = prev_close * (1.0 + gap);
        let ret = rng.gen_range(-1.0..1.0) * config.daily_vol;
        let close = (open * (1.0 + ret)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.5) * config.daily_vol);
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.5) * config.daily_vol);

        let vol_scale = if gapped {
            rng.gen_range(2.0..5.0)
        } else {
            rng.gen_range(0.6..1.4)
        };
        let volume = (config.base_volume as f64 * vol_scale).round() as u64;

        bars.push(Bar {
            ticker: ticker.to_string(),
            date,
            open,
            high,
            low,
            close,
            volume,
        });
        prev_close = close;
    }
    bars
}

/// Build an in-memory provider holding synthetic bars for `tickers`.
pub fn synthetic_provider(config: &SyntheticConfig, tickers: &[String]) -> InMemoryProvider {
    let mut provider = InMemoryProvider::new().with_name("synthetic");
    for ticker in tickers {
        provider.insert(ticker.clone(), generate_bars(config, ticker));
    }
    tracing::debug!(tickers = tickers.len(), seed = config.seed, "generated synthetic universe");
    provider
}
