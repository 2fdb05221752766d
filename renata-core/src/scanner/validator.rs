//! Compliance validator — static checks of the three-stage contract.
//!
//! A definition is compliant iff it separates universe selection from
//! per-ticker logic and never reads data from after the evaluated date.
//! Every check runs; a failed check contributes exactly one violation whose
//! detail lists all offending items.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::definition::{AggregateInput, RuleDefinition, Stage};
use crate::domain::ParamValue;
use crate::indicators::MAX_PERIOD;
use crate::rules::Operand;

/// The checks, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceCheck {
    /// One universe, one per-ticker, one aggregate stage, in that order;
    /// the universe stage reads only snapshot fields and scalars.
    StageSeparation,
    /// Per-ticker operands stay on the evaluated ticker and never look ahead.
    TickerIsolation,
    /// Aggregation reads only what the per-ticker stage produced.
    AggregateInputs,
    /// Referenced parameters are bound to numbers; indicator settings are sane.
    Bindings,
}

impl fmt::Display for ComplianceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StageSeparation => "stage separation",
            Self::TickerIsolation => "ticker isolation",
            Self::AggregateInputs => "aggregate inputs",
            Self::Bindings => "bindings",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub check: ComplianceCheck,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub compliant: bool,
    pub violations: Vec<Violation>,
}

impl ComplianceReport {
    pub fn failed(&self, check: ComplianceCheck) -> bool {
        self.violations.iter().any(|v| v.check == check)
    }
}

/// Validate `rule`. Deterministic and side-effect free.
pub fn validate(rule: &RuleDefinition) -> ComplianceReport {
    let checks: [(ComplianceCheck, fn(&RuleDefinition) -> Vec<String>); 4] = [
        (ComplianceCheck::StageSeparation, stage_separation),
        (ComplianceCheck::TickerIsolation, ticker_isolation),
        (ComplianceCheck::AggregateInputs, aggregate_inputs),
        (ComplianceCheck::Bindings, bindings),
    ];

    let violations: Vec<Violation> = checks
        .iter()
        .filter_map(|(check, run)| {
            let problems = run(rule);
            (!problems.is_empty()).then(|| Violation {
                check: *check,
                detail: problems.join("; "),
            })
        })
        .collect();

    ComplianceReport {
        compliant: violations.is_empty(),
        violations,
    }
}

fn stage_separation(rule: &RuleDefinition) -> Vec<String> {
    let mut problems = Vec::new();
    let kinds: Vec<&str> = rule.stages().iter().map(Stage::kind).collect();

    for expected in ["universe_fetch", "per_ticker", "aggregate"] {
        match kinds.iter().filter(|k| **k == expected).count() {
            0 => problems.push(format!("missing {expected} stage")),
            1 => {}
            n => problems.push(format!("{n} {expected} stages, expected one")),
        }
    }
    if problems.is_empty() && kinds != ["universe_fetch", "per_ticker", "aggregate"] {
        problems.push(format!("stages out of order: {}", kinds.join(" -> ")));
    }

    for stage in rule.stages() {
        if let Stage::UniverseFetch(universe) = stage {
            for filter in &universe.filters {
                if matches!(
                    filter.threshold,
                    Operand::Series { .. } | Operand::Peer { .. }
                ) {
                    problems.push(format!(
                        "universe filter on {} reads per-ticker data {}",
                        filter.field, filter.threshold
                    ));
                }
            }
        }
    }
    problems
}

fn ticker_isolation(rule: &RuleDefinition) -> Vec<String> {
    let mut problems = Vec::new();
    for stage in rule.stages() {
        let Stage::PerTicker(per_ticker) = stage else {
            continue;
        };
        for condition in &per_ticker.mold.conditions {
            for operand in condition.operands() {
                match operand {
                    Operand::Peer { ticker, .. } => problems.push(format!(
                        "condition '{}' reads another ticker ({ticker})",
                        condition.label
                    )),
                    Operand::Series { lag, .. } if *lag < 0 => problems.push(format!(
                        "condition '{}' looks ahead {} bar(s) via {operand}",
                        condition.label,
                        -lag
                    )),
                    _ => {}
                }
            }
        }
    }
    problems
}

fn aggregate_inputs(rule: &RuleDefinition) -> Vec<String> {
    let produced: BTreeSet<&str> = rule
        .stages()
        .iter()
        .filter_map(|s| match s {
            Stage::PerTicker(p) => Some(p.mold.output_keys()),
            _ => None,
        })
        .flatten()
        .collect();

    let mut problems = Vec::new();
    for stage in rule.stages() {
        let Stage::Aggregate(aggregate) = stage else {
            continue;
        };
        for input in &aggregate.inputs {
            match input {
                AggregateInput::MarketData { field } => {
                    problems.push(format!("reads raw market data field {field}"))
                }
                AggregateInput::TickerOutput { key } if !produced.contains(key.as_str()) => {
                    problems.push(format!("reads '{key}' which no per-ticker condition produces"))
                }
                AggregateInput::TickerOutput { .. } => {}
            }
        }
        if let Some(key) = &aggregate.rank_by {
            if !aggregate.ticker_keys().any(|k| k == key) {
                problems.push(format!("ranks by '{key}' which is not a declared input"));
            }
        }
    }
    problems
}

fn bindings(rule: &RuleDefinition) -> Vec<String> {
    let mut operands: Vec<&Operand> = Vec::new();
    for stage in rule.stages() {
        match stage {
            Stage::UniverseFetch(u) => operands.extend(u.filters.iter().map(|f| &f.threshold)),
            Stage::PerTicker(p) => operands.extend(p.mold.operands()),
            Stage::Aggregate(_) => {}
        }
    }

    let mut problems = Vec::new();
    let mut seen = BTreeSet::new();
    for operand in operands {
        if let Some(name) = operand.param_name() {
            if !seen.insert(name) {
                continue;
            }
            match rule.params().get(name) {
                None => problems.push(format!("parameter '{name}' is unbound")),
                Some(ParamValue::Text(_)) => {
                    problems.push(format!("parameter '{name}' is not numeric"))
                }
                Some(ParamValue::Number(v)) if !v.is_finite() => {
                    problems.push(format!("parameter '{name}' is not finite"))
                }
                Some(ParamValue::Number(_)) => {}
            }
        }
        if let Operand::Series { indicator, lag } | Operand::Peer { indicator, lag, .. } = operand
        {
            if !indicator.is_well_formed() {
                problems.push(format!("indicator {indicator:?} is malformed"));
            }
            if lag.unsigned_abs() > MAX_PERIOD as u64 {
                problems.push(format!("lag {lag} exceeds {MAX_PERIOD} bars"));
            }
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParameterSet, Timeframe};
    use crate::indicators::IndicatorSpec;
    use crate::rules::{Comparator, Condition, Mold};
    use crate::scanner::catalog::{SetupCatalog, OS_D1};
    use crate::scanner::definition::{
        AggregateStage, PerTickerStage, SnapshotField, UniverseFilter, UniverseStage,
    };
    use crate::scanner::generator::generate;

    fn compliant_rule() -> RuleDefinition {
        let setup = SetupCatalog::builtin().get(OS_D1).unwrap().clone();
        let params = ParameterSet::new()
            .with("gap_over_atr", 0.8)
            .with("vol_mult", 1.2);
        generate(&setup, &params, Timeframe::Daily).unwrap()
    }

    fn rebuild(rule: &RuleDefinition, stages: Vec<Stage>) -> RuleDefinition {
        RuleDefinition::from_stages(rule.setup(), rule.timeframe(), stages, rule.params().clone())
    }

    fn gap_mold(lag: i64) -> Mold {
        Mold::new(vec![Condition::new(
            "gap",
            Operand::Series {
                indicator: IndicatorSpec::GapPct,
                lag,
            },
            Comparator::Ge,
            Operand::Const { value: 0.02 },
        )])
    }

    fn gap_aggregate() -> AggregateStage {
        AggregateStage {
            inputs: vec![AggregateInput::TickerOutput { key: "gap".into() }],
            ..Default::default()
        }
    }

    #[test]
    fn generated_rule_is_compliant() {
        let report = validate(&compliant_rule());
        assert!(report.compliant, "{:?}", report.violations);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn missing_stage_is_reported() {
        let rule = compliant_rule();
        let stages = rule.stages()[..2].to_vec();
        let report = validate(&rebuild(&rule, stages));
        assert!(!report.compliant);
        assert!(report.failed(ComplianceCheck::StageSeparation));
        assert!(report.violations[0].detail.contains("missing aggregate stage"));
    }

    #[test]
    fn out_of_order_stages_are_reported() {
        let rule = compliant_rule();
        let mut stages = rule.stages().to_vec();
        stages.swap(0, 1);
        let report = validate(&rebuild(&rule, stages));
        assert!(report.violations[0].detail.contains("out of order"));
    }

    #[test]
    fn look_ahead_is_reported() {
        let rule = compliant_rule();
        let stages = vec![
            Stage::UniverseFetch(UniverseStage::default()),
            Stage::PerTicker(PerTickerStage { mold: gap_mold(-1) }),
            Stage::Aggregate(gap_aggregate()),
        ];
        let report = validate(&rebuild(&rule, stages));
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].check, ComplianceCheck::TickerIsolation);
        assert!(report.violations[0].detail.contains("looks ahead 1 bar"));
    }

    #[test]
    fn every_failed_check_is_reported_in_one_pass() {
        let rule = compliant_rule();
        let mut mold = gap_mold(0);
        mold.conditions.push(Condition::new(
            "vs_spy",
            Operand::Peer {
                ticker: "SPY".into(),
                indicator: IndicatorSpec::close(),
                lag: 0,
            },
            Comparator::Gt,
            Operand::param("unbound"),
        ));
        let stages = vec![
            Stage::UniverseFetch(UniverseStage {
                filters: vec![UniverseFilter {
                    field: SnapshotField::Close,
                    comparator: Comparator::Gt,
                    threshold: Operand::series(IndicatorSpec::Ema { period: 20 }),
                }],
            }),
            Stage::PerTicker(PerTickerStage { mold }),
            Stage::Aggregate(AggregateStage {
                inputs: vec![AggregateInput::MarketData {
                    field: SnapshotField::Volume,
                }],
                ..Default::default()
            }),
        ];
        let report = validate(&rebuild(&rule, stages));
        let checks: Vec<_> = report.violations.iter().map(|v| v.check).collect();
        assert_eq!(
            checks,
            [
                ComplianceCheck::StageSeparation,
                ComplianceCheck::TickerIsolation,
                ComplianceCheck::AggregateInputs,
                ComplianceCheck::Bindings,
            ]
        );
    }

    #[test]
    fn aggregate_reading_unknown_key_is_reported() {
        let rule = compliant_rule();
        let stages = vec![
            Stage::UniverseFetch(UniverseStage::default()),
            Stage::PerTicker(PerTickerStage { mold: gap_mold(0) }),
            Stage::Aggregate(AggregateStage {
                inputs: vec![AggregateInput::TickerOutput { key: "rsi".into() }],
                rank_by: Some("gap".into()),
                max_per_day: Some(3),
            }),
        ];
        let report = validate(&rebuild(&rule, stages));
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].detail.contains("'rsi'"));
        assert!(report.violations[0].detail.contains("ranks by 'gap'"));
    }

    #[test]
    fn malformed_indicator_in_failing_operands_is_reported_not_panicked() {
        let rule = compliant_rule();
        let broken = IndicatorSpec::Ema { period: 0 };
        let mold = Mold::new(vec![Condition::new(
            "ema",
            Operand::Series {
                indicator: broken.clone(),
                lag: -1,
            },
            Comparator::Gt,
            Operand::Const { value: 0.0 },
        )]);
        let stages = vec![
            Stage::UniverseFetch(UniverseStage {
                filters: vec![UniverseFilter {
                    field: SnapshotField::Close,
                    comparator: Comparator::Gt,
                    threshold: Operand::series(broken),
                }],
            }),
            Stage::PerTicker(PerTickerStage { mold }),
            Stage::Aggregate(AggregateStage {
                inputs: vec![AggregateInput::TickerOutput { key: "ema".into() }],
                ..Default::default()
            }),
        ];
        let report = validate(&rebuild(&rule, stages));
        assert!(!report.compliant);
        assert!(report.failed(ComplianceCheck::StageSeparation));
        assert!(report.failed(ComplianceCheck::TickerIsolation));
        assert!(report.failed(ComplianceCheck::Bindings));
        let isolation = report
            .violations
            .iter()
            .find(|v| v.check == ComplianceCheck::TickerIsolation)
            .unwrap();
        assert!(isolation.detail.contains("ema_0"));
    }

    #[test]
    fn oversized_period_or_lag_fails_bindings() {
        let rule = compliant_rule();
        let mold = Mold::new(vec![Condition::new(
            "gap",
            Operand::Series {
                indicator: IndicatorSpec::VolumeMultiple { period: 100_000_000 },
                lag: i64::MAX,
            },
            Comparator::Ge,
            Operand::Const { value: 1.0 },
        )]);
        let stages = vec![
            Stage::UniverseFetch(UniverseStage::default()),
            Stage::PerTicker(PerTickerStage { mold }),
            Stage::Aggregate(gap_aggregate()),
        ];
        let report = validate(&rebuild(&rule, stages));
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].check, ComplianceCheck::Bindings);
        assert!(report.violations[0].detail.contains("malformed"));
        assert!(report.violations[0].detail.contains("exceeds"));
    }

    #[test]
    fn validation_is_idempotent() {
        let rule = compliant_rule();
        assert_eq!(validate(&rule), validate(&rule));
    }
}
