//! Opening gap measures.
//!
//! gap[t] = open[t] - close[t-1]. Both ratios below only use bars up to t.

use super::atr::Atr;
use super::Indicator;
use crate::domain::Bar;

/// Gap as a fraction of the previous close. Lookback: 1.
#[derive(Debug, Clone, Default)]
pub struct GapPct;

impl Indicator for GapPct {
    fn name(&self) -> &str {
        "gap_pct"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        for i in 1..bars.len() {
            let pc = bars[i - 1].close;
            result[i] = (bars[i].open - pc) / pc;
        }
        result
    }
}

/// Gap measured in units of the previous bar's ATR.
///
/// gap_over_atr[t] = (open[t] - close[t-1]) / ATR[t-1].
/// Using ATR[t-1] keeps the denominator free of the gap bar's own range.
/// Lookback: atr_period + 1.
#[derive(Debug, Clone)]
pub struct GapOverAtr {
    atr_period: usize,
    name: String,
}

impl GapOverAtr {
    pub fn new(atr_period: usize) -> Self {
        Self {
            atr_period,
            name: format!("gap_over_atr_{atr_period}"),
        }
    }
}

impl Indicator for GapOverAtr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.atr_period.saturating_add(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let atr = Atr::new(self.atr_period).compute(bars);
        let mut result = vec![f64::NAN; bars.len()];
        for i in 1..bars.len() {
            let prev_atr = atr[i - 1];
            if prev_atr.is_nan() || prev_atr <= 0.0 {
                continue;
            }
            result[i] = (bars[i].open - bars[i - 1].close) / prev_atr;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};

    #[test]
    fn gap_pct_known_value() {
        let bars = make_ohlc_bars(&[(100.0, 101.0, 99.0, 100.0), (105.0, 106.0, 104.0, 105.0)]);
        let result = GapPct.compute(&bars);
        assert!(result[0].is_nan());
        assert_approx(result[1], 0.05, DEFAULT_EPSILON);
    }

    #[test]
    fn gap_over_atr_uses_prior_atr() {
        // Flat bars with TR = 2, then a bar gapping 1.6 above the prior close.
        let mut data: Vec<_> = (0..20).map(|_| (100.0, 101.0, 99.0, 100.0)).collect();
        data.push((101.6, 102.0, 101.0, 101.8));
        let bars = make_ohlc_bars(&data);
        let result = GapOverAtr::new(14).compute(&bars);
        assert!(result[14].is_nan());
        assert_approx(result[15], 0.0, DEFAULT_EPSILON);
        assert_approx(result[20], 0.8, 1e-9);
    }
}
