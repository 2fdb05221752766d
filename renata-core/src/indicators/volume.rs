//! Relative volume.

use super::Indicator;
use crate::domain::Bar;

/// volume[t] / mean(volume[t-period..t]) — today's volume against the
/// average of the `period` bars before it. Lookback: period.
#[derive(Debug, Clone)]
pub struct VolumeMultiple {
    period: usize,
    name: String,
}

impl VolumeMultiple {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume period must be >= 1");
        Self {
            period,
            name: format!("vol_mult_{period}"),
        }
    }
}

impl Indicator for VolumeMultiple {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        for i in self.period..n {
            let avg = bars[i - self.period..i]
                .iter()
                .map(|b| b.volume as f64)
                .sum::<f64>()
                / self.period as f64;
            if avg > 0.0 {
                result[i] = bars[i].volume as f64 / avg;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn volume_multiple_against_prior_average() {
        let mut bars = make_bars(&[10.0, 10.0, 10.0, 10.0]);
        bars[3].volume = 3000;
        let result = VolumeMultiple::new(3).compute(&bars);
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn zero_average_volume_is_undefined() {
        let mut bars = make_bars(&[10.0, 10.0, 10.0]);
        for b in &mut bars {
            b.volume = 0;
        }
        assert!(VolumeMultiple::new(2).compute(&bars)[2].is_nan());
    }
}
