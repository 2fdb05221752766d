//! Indicator engine.
//!
//! Indicators are pure functions: bar history in, numeric series out, aligned
//! 1:1 with the input bars. They are computed once per ticker before the
//! date loop and read by bar index during rule evaluation.
//!
//! Every indicator reports a `lookback`: the first `lookback` values are
//! undefined and [`compute`] forces them to NaN even if an implementation
//! could produce a partial-window number.

pub mod atr;
pub mod cloud;
pub mod ema;
pub mod gap;
pub mod sma;
pub mod volume;

pub use atr::Atr;
pub use cloud::{DeviationBand, EmaCloud, Edge};
pub use ema::Ema;
pub use gap::{GapOverAtr, GapPct};
pub use sma::Sma;
pub use volume::VolumeMultiple;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::Bar;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on data from bar t+1 or later. Every
/// indicator must pass the truncated-vs-full series test.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g. "ema_72", "atr_14").
    fn name(&self) -> &str;

    /// Number of leading bars without a valid value.
    fn lookback(&self) -> usize;

    /// Compute the indicator over the whole series. Same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Raw bar field exposed as a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Volume => "volume",
        }
    }

    pub fn read(self, bar: &Bar) -> f64 {
        match self {
            Self::Open => bar.open,
            Self::High => bar.high,
            Self::Low => bar.low,
            Self::Close => bar.close,
            Self::Volume => bar.volume as f64,
        }
    }
}

impl Indicator for PriceField {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        bars.iter().map(|b| self.read(b)).collect()
    }
}

/// Serializable description of an indicator. Rules carry these instead of
/// trait objects so they can be hashed, compared and validated statically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorSpec {
    Price { field: PriceField },
    Ema { period: usize },
    Sma { period: usize },
    Atr { period: usize },
    EmaCloud { fast: usize, slow: usize, edge: Edge },
    DeviationBand {
        fast: usize,
        slow: usize,
        atr_period: usize,
        mult: f64,
        edge: Edge,
    },
    GapPct,
    GapOverAtr { atr_period: usize },
    VolumeMultiple { period: usize },
}

impl IndicatorSpec {
    pub const fn close() -> Self {
        Self::Price {
            field: PriceField::Close,
        }
    }

    /// True when every period lies in `1..=MAX_PERIOD` and multipliers are finite.
    pub fn is_well_formed(&self) -> bool {
        match *self {
            Self::Price { .. } | Self::GapPct => true,
            Self::Ema { period } | Self::Sma { period } | Self::Atr { period } => {
                period_in_range(period)
            }
            Self::VolumeMultiple { period } => period_in_range(period),
            Self::GapOverAtr { atr_period } => period_in_range(atr_period),
            Self::EmaCloud { fast, slow, .. } => period_in_range(fast) && period_in_range(slow),
            Self::DeviationBand {
                fast,
                slow,
                atr_period,
                mult,
                ..
            } => {
                period_in_range(fast)
                    && period_in_range(slow)
                    && period_in_range(atr_period)
                    && mult.is_finite()
            }
        }
    }

    /// Build the runtime indicator. Callers must check `is_well_formed` first.
    pub fn build(&self) -> Box<dyn Indicator> {
        match *self {
            Self::Price { field } => Box::new(field),
            Self::Ema { period } => Box::new(Ema::new(period)),
            Self::Sma { period } => Box::new(Sma::new(period)),
            Self::Atr { period } => Box::new(Atr::new(period)),
            Self::EmaCloud { fast, slow, edge } => Box::new(EmaCloud::new(fast, slow, edge)),
            Self::DeviationBand {
                fast,
                slow,
                atr_period,
                mult,
                edge,
            } => Box::new(DeviationBand::new(fast, slow, atr_period, mult, edge)),
            Self::GapPct => Box::new(GapPct),
            Self::GapOverAtr { atr_period } => Box::new(GapOverAtr::new(atr_period)),
            Self::VolumeMultiple { period } => Box::new(VolumeMultiple::new(period)),
        }
    }

    /// Deterministic series name. Matches the built indicator's `name()` and
    /// never constructs it, so malformed specs can still be displayed.
    pub fn name(&self) -> String {
        match *self {
            Self::Price { field } => field.as_str().to_string(),
            Self::Ema { period } => format!("ema_{period}"),
            Self::Sma { period } => format!("sma_{period}"),
            Self::Atr { period } => format!("atr_{period}"),
            Self::EmaCloud { fast, slow, edge } => {
                format!("ema_cloud_{fast}_{slow}_{}", edge.suffix())
            }
            Self::DeviationBand {
                fast,
                slow,
                atr_period,
                mult,
                edge,
            } => format!(
                "dev_band_{fast}_{slow}_{atr_period}_{mult}_{}",
                edge.suffix()
            ),
            Self::GapPct => "gap_pct".to_string(),
            Self::GapOverAtr { atr_period } => format!("gap_over_atr_{atr_period}"),
            Self::VolumeMultiple { period } => format!("vol_mult_{period}"),
        }
    }

    /// Lookback without building the indicator. Saturating for malformed specs.
    pub fn lookback(&self) -> usize {
        match *self {
            Self::Price { .. } => 0,
            Self::Ema { period } | Self::Sma { period } => period.saturating_sub(1),
            Self::Atr { period } | Self::VolumeMultiple { period } => period,
            Self::EmaCloud { fast, slow, .. } => fast.max(slow).saturating_sub(1),
            Self::DeviationBand {
                fast,
                slow,
                atr_period,
                ..
            } => fast.max(slow).saturating_sub(1).max(atr_period),
            Self::GapPct => 1,
            Self::GapOverAtr { atr_period } => atr_period.saturating_add(1),
        }
    }
}

/// Longest period or lag a rule may use, about forty years of daily bars.
pub const MAX_PERIOD: usize = 10_000;

fn period_in_range(period: usize) -> bool {
    (1..=MAX_PERIOD).contains(&period)
}

/// Output of [`compute`]: values aligned 1:1 with the input bars.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    name: String,
    lookback: usize,
    values: Vec<f64>,
}

impl IndicatorSeries {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw values; undefined entries are NaN.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value at `index`, `None` while warming up, on NaN or out of range.
    pub fn get(&self, index: usize) -> Option<f64> {
        if index < self.lookback {
            return None;
        }
        self.values.get(index).copied().filter(|v| !v.is_nan())
    }
}

/// Compute `spec` over one ticker's bars.
pub fn compute(bars: &[Bar], spec: &IndicatorSpec) -> IndicatorSeries {
    let indicator = spec.build();
    let lookback = indicator.lookback();
    let mut values = indicator.compute(bars);
    debug_assert_eq!(values.len(), bars.len(), "{}: misaligned output", indicator.name());
    values.resize(bars.len(), f64::NAN);
    for v in values.iter_mut().take(lookback) {
        *v = f64::NAN;
    }
    IndicatorSeries {
        name: indicator.name().to_string(),
        lookback,
        values,
    }
}

/// Precomputed series for one ticker, keyed by indicator name.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, IndicatorSeries>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every spec not already present.
    pub fn precompute<'a>(
        bars: &[Bar],
        specs: impl IntoIterator<Item = &'a IndicatorSpec>,
    ) -> Self {
        let mut values = Self::new();
        for spec in specs {
            let series = compute(bars, spec);
            values
                .series
                .entry(series.name().to_string())
                .or_insert(series);
        }
        values
    }

    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.series.get(name).and_then(|s| s.get(index))
    }

    pub fn series(&self, name: &str) -> Option<&IndicatorSeries> {
        self.series.get(name)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Synthetic bars from closes: open = previous close, high/low ±1, volume 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                ticker: "TEST".to_string(),
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            ticker: "TEST".to_string(),
            date: base_date + chrono::Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000,
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
