//! Rule definitions: the three-stage scanner artifact.
//!
//! Stage 1 selects the day's universe from the grouped-daily snapshot.
//! Stage 2 evaluates a mold per ticker against that ticker's own history.
//! Stage 3 turns the per-ticker outcomes of one date into signals.
//!
//! Definitions are data, not code: they can be hashed, serialized and
//! statically validated before anything runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::domain::{Bar, ParameterSet, Signal, Timeframe};
use crate::rules::{Comparator, EvalError, Mold, MoldOutcome, Operand};

/// Field of a grouped-daily snapshot bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    Open,
    High,
    Low,
    Close,
    Volume,
    DollarVolume,
}

impl SnapshotField {
    pub fn read(self, bar: &Bar) -> f64 {
        match self {
            Self::Open => bar.open,
            Self::High => bar.high,
            Self::Low => bar.low,
            Self::Close => bar.close,
            Self::Volume => bar.volume as f64,
            Self::DollarVolume => bar.dollar_volume(),
        }
    }
}

impl fmt::Display for SnapshotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Volume => "volume",
            Self::DollarVolume => "dollar_volume",
        };
        f.write_str(s)
    }
}

/// `snapshot.field comparator threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseFilter {
    pub field: SnapshotField,
    pub comparator: Comparator,
    pub threshold: Operand,
}

/// Stage 1: which tickers of the day's snapshot are worth evaluating.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UniverseStage {
    pub filters: Vec<UniverseFilter>,
}

impl UniverseStage {
    /// True when `bar` passes every filter. Void bars never pass.
    pub fn admits(&self, bar: &Bar, params: &ParameterSet) -> Result<bool, EvalError> {
        if bar.is_void() {
            return Ok(false);
        }
        for filter in &self.filters {
            let threshold = filter.threshold.resolve_scalar(params)?;
            if !filter.comparator.apply(filter.field.read(bar), threshold) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Stage 2: the mold evaluated per ticker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerTickerStage {
    pub mold: Mold,
}

/// What the aggregation stage reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateInput {
    /// A value the per-ticker stage produced.
    TickerOutput { key: String },
    /// Raw snapshot data, bypassing the per-ticker stage.
    MarketData { field: SnapshotField },
}

/// Stage 3: turn one date's per-ticker outcomes into signals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateStage {
    pub inputs: Vec<AggregateInput>,
    /// Output key to rank matches by (descending) before applying the cap.
    #[serde(default)]
    pub rank_by: Option<String>,
    #[serde(default)]
    pub max_per_day: Option<usize>,
}

impl AggregateStage {
    /// Keys of the per-ticker outputs this stage reads.
    pub fn ticker_keys(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().filter_map(|input| match input {
            AggregateInput::TickerOutput { key } => Some(key.as_str()),
            AggregateInput::MarketData { .. } => None,
        })
    }

    /// Signals for one date, sorted by ticker. Only matched outcomes count.
    pub fn aggregate(
        &self,
        date: NaiveDate,
        outcomes: &[(String, MoldOutcome)],
        params: &ParameterSet,
    ) -> Vec<Signal> {
        let mut matched: Vec<&(String, MoldOutcome)> =
            outcomes.iter().filter(|(_, o)| o.matched).collect();

        if let Some(key) = &self.rank_by {
            matched.sort_by(|(ta, a), (tb, b)| {
                let va = a.values.get(key).copied();
                let vb = b.values.get(key).copied();
                match (va, vb) {
                    (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
                .then_with(|| ta.cmp(tb))
            });
        } else {
            matched.sort_by(|(ta, _), (tb, _)| ta.cmp(tb));
        }

        if let Some(cap) = self.max_per_day {
            matched.truncate(cap);
        }

        let keys: Vec<&str> = self.ticker_keys().collect();
        let mut signals: Vec<Signal> = matched
            .into_iter()
            .map(|(ticker, outcome)| Signal {
                ticker: ticker.clone(),
                date,
                values: outcome
                    .values
                    .iter()
                    .filter(|(k, _)| keys.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
                params: params.clone(),
            })
            .collect();
        signals.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        signals
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    UniverseFetch(UniverseStage),
    PerTicker(PerTickerStage),
    Aggregate(AggregateStage),
}

impl Stage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UniverseFetch(_) => "universe_fetch",
            Self::PerTicker(_) => "per_ticker",
            Self::Aggregate(_) => "aggregate",
        }
    }
}

/// The generated artifact. Immutable: regeneration yields a new definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    setup: String,
    timeframe: Timeframe,
    stages: Vec<Stage>,
    params: ParameterSet,
}

impl RuleDefinition {
    /// Assemble a definition from explicit stages. The generator uses this;
    /// hand-built definitions should go through the validator before use.
    pub fn from_stages(
        setup: impl Into<String>,
        timeframe: Timeframe,
        stages: Vec<Stage>,
        params: ParameterSet,
    ) -> Self {
        Self {
            setup: setup.into(),
            timeframe,
            stages,
            params,
        }
    }

    pub fn setup(&self) -> &str {
        &self.setup
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Effective parameters: caller values over setup defaults.
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn universe(&self) -> Option<&UniverseStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::UniverseFetch(u) => Some(u),
            _ => None,
        })
    }

    pub fn per_ticker(&self) -> Option<&PerTickerStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::PerTicker(p) => Some(p),
            _ => None,
        })
    }

    pub fn aggregate(&self) -> Option<&AggregateStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::Aggregate(a) => Some(a),
            _ => None,
        })
    }

    /// Bars of history the per-ticker stage needs before `start`.
    pub fn warmup_bars(&self) -> usize {
        self.per_ticker().map_or(0, |p| p.mold.warmup_bars())
    }

    /// Content hash over the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).expect("RuleDefinition must serialize");
        blake3::hash(&json).to_hex().to_string()
    }
}
