//! EMA clouds and the deviation bands built around them.
//!
//! A cloud is the region between a fast and a slow EMA (9/20, 72/89 in the
//! Lingua notes). Its upper edge is max(fast, slow), lower edge min(fast, slow).
//! Deviation bands push the cloud edges outward by `mult` × ATR.

use serde::{Deserialize, Serialize};

use super::atr::Atr;
use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Bar;

/// Which edge of a cloud or band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Upper,
    Lower,
}

impl Edge {
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            Self::Upper => "upper",
            Self::Lower => "lower",
        }
    }

    fn pick(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Upper => a.max(b),
            Self::Lower => a.min(b),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmaCloud {
    fast: usize,
    slow: usize,
    edge: Edge,
    name: String,
}

impl EmaCloud {
    pub fn new(fast: usize, slow: usize, edge: Edge) -> Self {
        assert!(fast >= 1 && slow >= 1, "EMA cloud periods must be >= 1");
        Self {
            fast,
            slow,
            edge,
            name: format!("ema_cloud_{fast}_{slow}_{}", edge.suffix()),
        }
    }
}

impl Indicator for EmaCloud {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.fast.max(self.slow) - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        cloud_edge(bars, self.fast, self.slow, self.edge)
    }
}

fn cloud_edge(bars: &[Bar], fast: usize, slow: usize, edge: Edge) -> Vec<f64> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let f = ema_of_series(&closes, fast);
    let s = ema_of_series(&closes, slow);
    f.iter()
        .zip(&s)
        .map(|(&a, &b)| {
            if a.is_nan() || b.is_nan() {
                f64::NAN
            } else {
                edge.pick(a, b)
            }
        })
        .collect()
}

/// Cloud edge displaced by `mult` × ATR(`atr_period`), away from the cloud.
#[derive(Debug, Clone)]
pub struct DeviationBand {
    fast: usize,
    slow: usize,
    atr_period: usize,
    mult: f64,
    edge: Edge,
    name: String,
}

impl DeviationBand {
    pub fn new(fast: usize, slow: usize, atr_period: usize, mult: f64, edge: Edge) -> Self {
        assert!(fast >= 1 && slow >= 1, "deviation band periods must be >= 1");
        Self {
            fast,
            slow,
            atr_period,
            mult,
            edge,
            name: format!(
                "dev_band_{fast}_{slow}_{atr_period}_{mult}_{}",
                edge.suffix()
            ),
        }
    }
}

impl Indicator for DeviationBand {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        (self.fast.max(self.slow) - 1).max(self.atr_period)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let edge = cloud_edge(bars, self.fast, self.slow, self.edge);
        let atr = Atr::new(self.atr_period).compute(bars);
        let sign = match self.edge {
            Edge::Upper => 1.0,
            Edge::Lower => -1.0,
        };
        edge.iter()
            .zip(&atr)
            .map(|(&e, &a)| e + sign * self.mult * a)
            .collect()
    }
}
