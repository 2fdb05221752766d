//! Molds: the concrete condition set a setup + parameter values produce.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::condition::{Condition, Operand};
use crate::domain::{Bar, ParameterSet};
use crate::indicators::{IndicatorSpec, IndicatorValues};

/// Per-ticker evaluation failures. The runner records these as skips.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("parameter '{0}' is not bound to a numeric value")]
    UnboundParameter(String),

    #[error("operand reads {lag} bars into the future")]
    LookAhead { lag: i64 },

    #[error("operand reads data of another ticker '{ticker}'")]
    IsolationViolation { ticker: String },

    #[error("operand '{0}' has no scalar value outside per-ticker evaluation")]
    NotScalar(String),

    #[error("indicator series '{0}' was not precomputed")]
    MissingSeries(String),

    #[error("no data for {ticker} on {date}")]
    DataUnavailable {
        ticker: String,
        date: chrono::NaiveDate,
    },
}

/// Everything the per-ticker stage may read: one ticker's bars and the
/// series precomputed from them.
#[derive(Debug, Clone, Copy)]
pub struct TickerContext<'a> {
    pub ticker: &'a str,
    pub bars: &'a [Bar],
    pub indicators: &'a IndicatorValues,
}

/// Result of evaluating a mold at one bar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MoldOutcome {
    pub matched: bool,
    /// Condition label → left-hand value, for every condition defined at this bar.
    pub values: BTreeMap<String, f64>,
}

/// Conjunction of conditions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mold {
    pub conditions: Vec<Condition>,
}

impl Mold {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    /// Every operand of every condition, left then right.
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        self.conditions.iter().flat_map(|c| c.operands())
    }

    /// Own-ticker series the mold reads; precompute these before evaluating.
    pub fn required_series(&self) -> Vec<IndicatorSpec> {
        let mut specs: Vec<IndicatorSpec> = Vec::new();
        for op in self.operands() {
            if let Operand::Series { indicator, .. } = op {
                if !specs.contains(indicator) {
                    specs.push(indicator.clone());
                }
            }
        }
        specs
    }

    /// Bars of history needed before the first fully defined evaluation.
    pub fn warmup_bars(&self) -> usize {
        self.operands()
            .filter_map(|op| match op {
                Operand::Series { indicator, lag } => Some(
                    indicator
                        .lookback()
                        .saturating_add(usize::try_from(*lag).unwrap_or(0)),
                ),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Keys this mold writes into `MoldOutcome::values`.
    pub fn output_keys(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.label.as_str()).collect()
    }

    /// Evaluate at `index`. A condition with an undefined side is false.
    pub fn evaluate(
        &self,
        ctx: &TickerContext<'_>,
        index: usize,
        params: &ParameterSet,
    ) -> Result<MoldOutcome, EvalError> {
        let mut outcome = MoldOutcome {
            matched: !self.conditions.is_empty(),
            values: BTreeMap::new(),
        };

        for condition in &self.conditions {
            let left = condition.left.resolve(ctx, index, params)?;
            let right = condition.right.resolve(ctx, index, params)?;
            if let Some(l) = left {
                outcome.values.insert(condition.label.clone(), l);
            }
            let holds = match (left, right) {
                (Some(l), Some(r)) => condition.comparator.apply(l, r),
                _ => false,
            };
            outcome.matched &= holds;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, IndicatorSpec};
    use crate::rules::Comparator;

    fn close_above(threshold: Operand) -> Mold {
        Mold::new(vec![Condition::new(
            "close",
            Operand::series(IndicatorSpec::close()),
            Comparator::Ge,
            threshold,
        )])
    }

    fn with_ctx<R>(bars: &[Bar], mold: &Mold, f: impl FnOnce(TickerContext<'_>) -> R) -> R {
        let indicators = IndicatorValues::precompute(bars, &mold.required_series());
        f(TickerContext {
            ticker: "TEST",
            bars,
            indicators: &indicators,
        })
    }

    #[test]
    fn matches_when_all_conditions_hold() {
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let mold = close_above(Operand::param("min_close"));
        let params = ParameterSet::new().with("min_close", 11.0);
        with_ctx(&bars, &mold, |ctx| {
            assert!(!mold.evaluate(&ctx, 0, &params).unwrap().matched);
            let hit = mold.evaluate(&ctx, 1, &params).unwrap();
            assert!(hit.matched);
            assert_eq!(hit.values.get("close"), Some(&11.0));
        });
    }

    #[test]
    fn undefined_value_is_no_match() {
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let mold = Mold::new(vec![Condition::new(
            "ema",
            Operand::series(IndicatorSpec::Ema { period: 3 }),
            Comparator::Gt,
            Operand::Const { value: 0.0 },
        )]);
        with_ctx(&bars, &mold, |ctx| {
            let early = mold.evaluate(&ctx, 1, &ParameterSet::new()).unwrap();
            assert!(!early.matched);
            assert!(early.values.is_empty());
            assert!(mold.evaluate(&ctx, 2, &ParameterSet::new()).unwrap().matched);
        });
    }

    #[test]
    fn lagged_series_reads_previous_bar() {
        let bars = make_bars(&[10.0, 20.0]);
        let mold = close_above(Operand::Series {
            indicator: IndicatorSpec::close(),
            lag: 1,
        });
        with_ctx(&bars, &mold, |ctx| {
            assert!(!mold.evaluate(&ctx, 0, &ParameterSet::new()).unwrap().matched);
            assert!(mold.evaluate(&ctx, 1, &ParameterSet::new()).unwrap().matched);
        });
    }

    #[test]
    fn unbound_parameter_is_an_error() {
        let bars = make_bars(&[10.0]);
        let mold = close_above(Operand::param("missing"));
        with_ctx(&bars, &mold, |ctx| {
            assert_eq!(
                mold.evaluate(&ctx, 0, &ParameterSet::new()),
                Err(EvalError::UnboundParameter("missing".into()))
            );
        });
    }

    #[test]
    fn negative_lag_and_peer_refuse_to_evaluate() {
        let bars = make_bars(&[10.0, 11.0]);
        let future = close_above(Operand::Series {
            indicator: IndicatorSpec::close(),
            lag: -1,
        });
        with_ctx(&bars, &future, |ctx| {
            assert_eq!(
                future.evaluate(&ctx, 0, &ParameterSet::new()),
                Err(EvalError::LookAhead { lag: -1 })
            );
        });

        let peer = close_above(Operand::Peer {
            ticker: "SPY".into(),
            indicator: IndicatorSpec::close(),
            lag: 0,
        });
        with_ctx(&bars, &peer, |ctx| {
            assert!(matches!(
                peer.evaluate(&ctx, 0, &ParameterSet::new()),
                Err(EvalError::IsolationViolation { .. })
            ));
        });
    }

    #[test]
    fn warmup_accounts_for_lag() {
        let mold = Mold::new(vec![Condition::new(
            "x",
            Operand::Series {
                indicator: IndicatorSpec::Ema { period: 20 },
                lag: 2,
            },
            Comparator::Gt,
            Operand::series(IndicatorSpec::Atr { period: 14 }),
        )]);
        assert_eq!(mold.warmup_bars(), 21);
        assert_eq!(mold.required_series().len(), 2);
    }

    #[test]
    fn warmup_saturates_instead_of_overflowing() {
        let mold = Mold::new(vec![Condition::new(
            "x",
            Operand::Series {
                indicator: IndicatorSpec::GapOverAtr {
                    atr_period: usize::MAX,
                },
                lag: i64::MAX,
            },
            Comparator::Gt,
            Operand::Const { value: 0.0 },
        )]);
        assert_eq!(mold.warmup_bars(), usize::MAX);
    }
}
