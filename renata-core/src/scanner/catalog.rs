//! Setup catalog — the read-only source of `SetupDescriptor` records.
//!
//! The built-in catalog carries the setups the generator has templates for.
//! Curated catalogs can be loaded from TOML; entries are looked up by name.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{ParameterSet, SetupDescriptor, Timeframe};

pub const OS_D1: &str = "OS D1";
pub const GAP_OVER_ATR: &str = "Gap Over ATR";
pub const CLOUD_EXTENSION: &str = "Cloud Extension";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate setup name '{0}'")]
    Duplicate(String),
}

#[derive(Debug, Clone, Default)]
pub struct SetupCatalog {
    setups: BTreeMap<String, SetupDescriptor>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    setups: Vec<SetupDescriptor>,
}

impl SetupCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The setups shipped with the generator.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(SetupDescriptor {
            name: OS_D1.into(),
            description: "Overextended gap up on expanding volume, first day".into(),
            required_parameters: vec!["gap_over_atr".into(), "vol_mult".into()],
            defaults: universe_defaults()
                .with("atr_period", 14.0)
                .with("vol_period", 20.0),
            timeframes: vec![Timeframe::Daily],
        });
        catalog.insert(SetupDescriptor {
            name: GAP_OVER_ATR.into(),
            description: "Opening gap of at least N average true ranges".into(),
            required_parameters: vec!["gap_over_atr".into()],
            defaults: universe_defaults().with("atr_period", 14.0),
            timeframes: vec![Timeframe::Daily, Timeframe::Hourly],
        });
        catalog.insert(SetupDescriptor {
            name: CLOUD_EXTENSION.into(),
            description: "Close stretched beyond the 72/89 EMA cloud deviation band".into(),
            required_parameters: vec!["dev_mult".into()],
            defaults: universe_defaults()
                .with("cloud_fast", 72.0)
                .with("cloud_slow", 89.0)
                .with("atr_period", 14.0),
            timeframes: vec![Timeframe::Daily, Timeframe::Hourly],
        });
        catalog
    }

    /// Parse a `[[setups]]` TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(s)?;
        let mut catalog = Self::new();
        for setup in file.setups {
            if catalog.setups.contains_key(&setup.name) {
                return Err(CatalogError::Duplicate(setup.name));
            }
            catalog.insert(setup);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, setup: SetupDescriptor) {
        self.setups.insert(setup.name.clone(), setup);
    }

    pub fn get(&self, name: &str) -> Option<&SetupDescriptor> {
        self.setups.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SetupDescriptor> {
        self.setups.values()
    }

    pub fn len(&self) -> usize {
        self.setups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setups.is_empty()
    }
}

fn universe_defaults() -> ParameterSet {
    ParameterSet::new()
        .with("min_price", 1.0)
        .with("min_volume", 0.0)
}
