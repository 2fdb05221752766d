//! Signal — one scanner match.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::params::ParameterSet;

/// A single match: ticker, date, the values that triggered it, and the
/// parameter set active at match time. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    pub date: NaiveDate,
    /// Condition label / aggregate input key → observed value.
    pub values: BTreeMap<String, f64>,
    pub params: ParameterSet,
}

impl Signal {
    /// Sort key used for every signal list handed back to a caller.
    pub fn sort_key(&self) -> (NaiveDate, &str) {
        (self.date, self.ticker.as_str())
    }
}
