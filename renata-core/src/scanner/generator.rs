//! Scanner generator — setup + parameters → `RuleDefinition`.
//!
//! Templates are keyed by setup name and build structured stages directly;
//! nothing is rendered to source text. Every stage reads only the
//! evaluated ticker, the evaluated date and the parameter set, so
//! per-ticker evaluation can run in parallel.

use thiserror::Error;
use tracing::debug;

use super::catalog::{SetupCatalog, CLOUD_EXTENSION, GAP_OVER_ATR, OS_D1};
use super::definition::{
    AggregateInput, AggregateStage, PerTickerStage, RuleDefinition, SnapshotField, Stage,
    UniverseFilter, UniverseStage,
};
use crate::domain::{ParamValue, ParameterSet, SetupDescriptor, Timeframe};
use crate::indicators::{Edge, IndicatorSpec, MAX_PERIOD};
use crate::rules::{Comparator, Condition, Mold, Operand};

/// Generation-time errors. All are caller-correctable; no partial
/// definition is ever returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError {
    #[error("setup '{setup}' is missing required parameters: {}", missing.join(", "))]
    MissingParameter { setup: String, missing: Vec<String> },

    #[error("unknown setup '{0}'")]
    UnknownSetup(String),

    #[error("setup '{setup}' does not support the {timeframe} timeframe")]
    UnsupportedTimeframe { setup: String, timeframe: Timeframe },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

type Template = fn(&ParameterSet) -> Result<Vec<Stage>, GenerateError>;

fn template_for(setup: &str) -> Option<Template> {
    match setup {
        OS_D1 => Some(os_d1),
        GAP_OVER_ATR => Some(gap_over_atr),
        CLOUD_EXTENSION => Some(cloud_extension),
        _ => None,
    }
}

/// Generate a rule definition for `setup`.
pub fn generate(
    setup: &SetupDescriptor,
    params: &ParameterSet,
    timeframe: Timeframe,
) -> Result<RuleDefinition, GenerateError> {
    let template =
        template_for(&setup.name).ok_or_else(|| GenerateError::UnknownSetup(setup.name.clone()))?;

    let missing = setup.missing_parameters(params);
    if !missing.is_empty() {
        return Err(GenerateError::MissingParameter {
            setup: setup.name.clone(),
            missing,
        });
    }

    if !setup.supports(timeframe) {
        return Err(GenerateError::UnsupportedTimeframe {
            setup: setup.name.clone(),
            timeframe,
        });
    }

    let effective = params.merged_over(&setup.defaults);
    let stages = template(&effective)?;
    let rule = RuleDefinition::from_stages(setup.name.clone(), timeframe, stages, effective);
    debug!(
        setup = %setup.name,
        %timeframe,
        fingerprint = %rule.fingerprint(),
        "generated rule definition"
    );
    Ok(rule)
}

/// Generator bound to a catalog, resolving setups by name.
#[derive(Debug, Clone)]
pub struct ScannerGenerator {
    catalog: SetupCatalog,
}

impl Default for ScannerGenerator {
    fn default() -> Self {
        Self::new(SetupCatalog::builtin())
    }
}

impl ScannerGenerator {
    pub fn new(catalog: SetupCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SetupCatalog {
        &self.catalog
    }

    pub fn generate_by_name(
        &self,
        setup: &str,
        params: &ParameterSet,
        timeframe: Timeframe,
    ) -> Result<RuleDefinition, GenerateError> {
        let descriptor = self
            .catalog
            .get(setup)
            .ok_or_else(|| GenerateError::UnknownSetup(setup.to_string()))?;
        generate(descriptor, params, timeframe)
    }
}

// ─── Parameter helpers ───────────────────────────────────────────────

fn number(params: &ParameterSet, name: &str) -> Result<f64, GenerateError> {
    let invalid = |reason: &str| GenerateError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    match params.get(name) {
        Some(ParamValue::Number(v)) if v.is_finite() => Ok(*v),
        Some(ParamValue::Number(_)) => Err(invalid("must be finite")),
        Some(ParamValue::Text(_)) => Err(invalid("must be numeric")),
        None => Err(invalid("no value or default")),
    }
}

fn period(params: &ParameterSet, name: &str) -> Result<usize, GenerateError> {
    let v = number(params, name)?;
    if v < 1.0 || v > MAX_PERIOD as f64 || v.fract() != 0.0 {
        return Err(GenerateError::InvalidParameter {
            name: name.to_string(),
            reason: format!("must be a whole number in 1..={MAX_PERIOD}, got {v}"),
        });
    }
    Ok(v as usize)
}

/// Numeric threshold operand; validates the value now so the runner
/// never meets an unbound or textual threshold.
fn threshold(params: &ParameterSet, name: &str) -> Result<Operand, GenerateError> {
    number(params, name)?;
    Ok(Operand::param(name))
}

// ─── Stage builders shared by templates ──────────────────────────────

fn universe(params: &ParameterSet) -> Result<UniverseStage, GenerateError> {
    Ok(UniverseStage {
        filters: vec![
            UniverseFilter {
                field: SnapshotField::Close,
                comparator: Comparator::Ge,
                threshold: threshold(params, "min_price")?,
            },
            UniverseFilter {
                field: SnapshotField::Volume,
                comparator: Comparator::Ge,
                threshold: threshold(params, "min_volume")?,
            },
        ],
    })
}

fn aggregate(mold: &Mold, params: &ParameterSet) -> Result<AggregateStage, GenerateError> {
    let max_per_day = if params.contains("max_per_day") {
        Some(period(params, "max_per_day")?)
    } else {
        None
    };
    Ok(AggregateStage {
        inputs: mold
            .output_keys()
            .into_iter()
            .map(|key| AggregateInput::TickerOutput { key: key.to_string() })
            .collect(),
        rank_by: max_per_day.and(mold.output_keys().first().map(|k| k.to_string())),
        max_per_day,
    })
}

fn assemble(mold: Mold, params: &ParameterSet) -> Result<Vec<Stage>, GenerateError> {
    let universe = universe(params)?;
    let aggregate = aggregate(&mold, params)?;
    Ok(vec![
        Stage::UniverseFetch(universe),
        Stage::PerTicker(PerTickerStage { mold }),
        Stage::Aggregate(aggregate),
    ])
}

fn gap_condition(params: &ParameterSet) -> Result<Condition, GenerateError> {
    Ok(Condition::new(
        "gap_over_atr",
        Operand::series(IndicatorSpec::GapOverAtr {
            atr_period: period(params, "atr_period")?,
        }),
        Comparator::Ge,
        threshold(params, "gap_over_atr")?,
    ))
}

// ─── Templates ───────────────────────────────────────────────────────

fn os_d1(params: &ParameterSet) -> Result<Vec<Stage>, GenerateError> {
    let mold = Mold::new(vec![
        gap_condition(params)?,
        Condition::new(
            "vol_mult",
            Operand::series(IndicatorSpec::VolumeMultiple {
                period: period(params, "vol_period")?,
            }),
            Comparator::Ge,
            threshold(params, "vol_mult")?,
        ),
    ]);
    assemble(mold, params)
}

fn gap_over_atr(params: &ParameterSet) -> Result<Vec<Stage>, GenerateError> {
    assemble(Mold::new(vec![gap_condition(params)?]), params)
}

fn cloud_extension(params: &ParameterSet) -> Result<Vec<Stage>, GenerateError> {
    let fast = period(params, "cloud_fast")?;
    let slow = period(params, "cloud_slow")?;
    let dev_mult = number(params, "dev_mult")?;
    let mold = Mold::new(vec![
        Condition::new(
            "close_over_dev_band",
            Operand::series(IndicatorSpec::close()),
            Comparator::Ge,
            Operand::series(IndicatorSpec::DeviationBand {
                fast,
                slow,
                atr_period: period(params, "atr_period")?,
                mult: dev_mult,
                edge: Edge::Upper,
            }),
        ),
        Condition::new(
            "close_over_ema_cloud_9_20",
            Operand::series(IndicatorSpec::close()),
            Comparator::Gt,
            Operand::series(IndicatorSpec::EmaCloud {
                fast: 9,
                slow: 20,
                edge: Edge::Upper,
            }),
        ),
    ]);
    assemble(mold, params)
}
