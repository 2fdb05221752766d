//! Setup descriptors: named trading patterns and their parameter schemas.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::params::ParameterSet;

/// Bar timeframe a setup applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Daily,
    Hourly,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Hourly => write!(f, "hourly"),
        }
    }
}

/// One entry of the setup catalog. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Parameters every generation request must supply.
    pub required_parameters: Vec<String>,
    /// Optional parameters and the values used when the caller omits them.
    #[serde(default)]
    pub defaults: ParameterSet,
    pub timeframes: Vec<Timeframe>,
}

impl SetupDescriptor {
    /// Names from `required_parameters` absent in `params`, in descriptor order.
    pub fn missing_parameters(&self, params: &ParameterSet) -> Vec<String> {
        self.required_parameters
            .iter()
            .filter(|name| !params.contains(name))
            .cloned()
            .collect()
    }

    pub fn supports(&self, timeframe: Timeframe) -> bool {
        self.timeframes.contains(&timeframe)
    }
}
