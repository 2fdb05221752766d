//! Operands, comparators and conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::mold::{EvalError, TickerContext};
use crate::domain::ParameterSet;
use crate::indicators::IndicatorSpec;

/// Comparison between the left and right operand of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// A value a condition can read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    /// The evaluated ticker's own series, `lag` bars before the evaluated bar.
    /// A negative lag reads the future.
    Series {
        indicator: IndicatorSpec,
        #[serde(default)]
        lag: i64,
    },
    /// Another ticker's series. Breaks per-ticker isolation.
    Peer {
        ticker: String,
        indicator: IndicatorSpec,
        #[serde(default)]
        lag: i64,
    },
    /// Named numeric parameter from the rule's parameter set.
    Param { name: String },
    Const { value: f64 },
}

impl Operand {
    pub fn series(indicator: IndicatorSpec) -> Self {
        Self::Series { indicator, lag: 0 }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Param { name: name.into() }
    }

    /// Resolve at `index`. `Ok(None)` means the value is undefined there
    /// (warmup, NaN, or before the first bar).
    pub fn resolve(
        &self,
        ctx: &TickerContext<'_>,
        index: usize,
        params: &ParameterSet,
    ) -> Result<Option<f64>, EvalError> {
        match self {
            Self::Series { indicator, lag } => {
                if *lag < 0 {
                    return Err(EvalError::LookAhead { lag: *lag });
                }
                let name = indicator.name();
                let series = ctx
                    .indicators
                    .series(&name)
                    .ok_or(EvalError::MissingSeries(name))?;
                let Some(at) = (index as i64).checked_sub(*lag).filter(|i| *i >= 0) else {
                    return Ok(None);
                };
                Ok(series.get(at as usize))
            }
            Self::Peer { ticker, .. } => Err(EvalError::IsolationViolation {
                ticker: ticker.clone(),
            }),
            Self::Param { name } => params
                .number(name)
                .map(Some)
                .ok_or_else(|| EvalError::UnboundParameter(name.clone())),
            Self::Const { value } => Ok(Some(*value)),
        }
    }
}

impl Operand {
    /// Resolve without a ticker context: only parameters and constants.
    pub fn resolve_scalar(&self, params: &ParameterSet) -> Result<f64, EvalError> {
        match self {
            Self::Param { name } => params
                .number(name)
                .ok_or_else(|| EvalError::UnboundParameter(name.clone())),
            Self::Const { value } => Ok(*value),
            other => Err(EvalError::NotScalar(other.to_string())),
        }
    }

    /// Parameter name this operand binds to, if any.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Self::Param { name } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Series { indicator, lag } => {
                write!(f, "{}", indicator.name())?;
                write_lag(f, *lag)
            }
            Self::Peer {
                ticker,
                indicator,
                lag,
            } => {
                write!(f, "{ticker}.{}", indicator.name())?;
                write_lag(f, *lag)
            }
            Self::Param { name } => write!(f, "${name}"),
            Self::Const { value } => write!(f, "{value}"),
        }
    }
}

// `[-n]` reads n bars back, `[+n]` n bars ahead.
fn write_lag(f: &mut fmt::Formatter<'_>, lag: i64) -> fmt::Result {
    match lag {
        0 => Ok(()),
        l if l > 0 => write!(f, "[-{l}]"),
        l => write!(f, "[+{}]", -l),
    }
}

/// `left comparator right`, identified by `label` in signal output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub label: String,
    pub left: Operand,
    pub comparator: Comparator,
    pub right: Operand,
}

impl Condition {
    pub fn new(
        label: impl Into<String>,
        left: Operand,
        comparator: Comparator,
        right: Operand,
    ) -> Self {
        Self {
            label: label.into(),
            left,
            comparator,
            right,
        }
    }

    pub fn operands(&self) -> [&Operand; 2] {
        [&self.left, &self.right]
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} {}",
            self.label,
            self.left,
            self.comparator.symbol(),
            self.right
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparator_boundaries() {
        assert!(Comparator::Ge.apply(0.8, 0.8));
        assert!(!Comparator::Gt.apply(0.8, 0.8));
        assert!(Comparator::Le.apply(0.8, 0.8));
        assert!(!Comparator::Lt.apply(0.8, 0.8));
    }

    #[test]
    fn display_is_readable() {
        let cond = Condition::new(
            "gap",
            Operand::series(IndicatorSpec::GapOverAtr { atr_period: 14 }),
            Comparator::Ge,
            Operand::param("gap_over_atr"),
        );
        assert_eq!(cond.to_string(), "gap: gap_over_atr_14 >= $gap_over_atr");
    }

    #[test]
    fn operand_serde_shape() {
        let op = Operand::param("vol_mult");
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"kind":"param","name":"vol_mult"}"#);
        let series: Operand =
            serde_json::from_str(r#"{"kind":"series","indicator":{"kind":"ema","period":9}}"#)
                .unwrap();
        assert_eq!(series, Operand::series(IndicatorSpec::Ema { period: 9 }));
    }
}
