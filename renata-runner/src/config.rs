//! Serializable scan configuration.
//!
//! A `ScanConfig` names everything needed to reproduce a scan: the setup and
//! its parameters, the ticker set, the date range and the data provider.
//! Providers are built from the config explicitly; nothing is read from
//! ambient global state except the API key variable the config names.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use renata_core::data::{
    synthetic_provider, CircuitBreaker, DataError, MarketDataProvider, ParquetCache,
    PolygonConfig, PolygonProvider, SyntheticConfig,
};
use renata_core::domain::{ParameterSet, Timeframe};
use renata_core::scanner::{CatalogError, SetupCatalog};

/// Content hash identifying a scan configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("environment variable '{0}' holding the API key is not set")]
    MissingApiKey(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("provider setup failed: {0}")]
    Provider(#[from] DataError),
}

/// Which market data provider a scan reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Seeded synthetic bars for the configured tickers.
    Synthetic {
        seed: u64,
        #[serde(default)]
        gap_probability: Option<f64>,
    },
    /// Bars previously written to a Parquet cache directory.
    ParquetCache { dir: PathBuf },
    /// Polygon-style aggregates API.
    Polygon {
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

fn default_api_key_env() -> String {
    "POLYGON_API_KEY".into()
}

fn default_timeframe() -> Timeframe {
    Timeframe::Daily
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub setup: String,
    #[serde(default)]
    pub params: ParameterSet,
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    pub provider: ProviderConfig,
    /// Optional curated catalog (TOML); the built-in catalog otherwise.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

impl ScanConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.setup.trim().is_empty() {
            return Err(ConfigError::Invalid("setup name is empty".into()));
        }
        if self.tickers.is_empty() {
            return Err(ConfigError::Invalid("no tickers configured".into()));
        }
        if let Some(t) = self.tickers.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("blank ticker {t:?}")));
        }
        if self.end < self.start {
            return Err(ConfigError::Invalid(format!(
                "end {} precedes start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }

    /// Deterministic hash over the canonical JSON form.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("ScanConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    pub fn load_catalog(&self) -> Result<SetupCatalog, ConfigError> {
        match &self.catalog {
            None => Ok(SetupCatalog::builtin()),
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Ok(SetupCatalog::from_toml_str(&content)?)
            }
        }
    }

    /// Build the configured provider. `history_start` bounds how far back
    /// synthetic data is generated.
    pub fn build_provider(
        &self,
        history_start: NaiveDate,
    ) -> Result<Box<dyn MarketDataProvider>, ConfigError> {
        match &self.provider {
            ProviderConfig::Synthetic {
                seed,
                gap_probability,
            } => {
                let mut synth = SyntheticConfig::new(*seed, history_start, self.end);
                if let Some(p) = gap_probability {
                    synth.gap_probability = *p;
                }
                Ok(Box::new(synthetic_provider(&synth, &self.tickers)))
            }
            ProviderConfig::ParquetCache { dir } => {
                let cache = ParquetCache::new(dir);
                Ok(Box::new(cache.load_provider(Some(&self.tickers))?))
            }
            ProviderConfig::Polygon {
                api_key_env,
                base_url,
            } => {
                let api_key = std::env::var(api_key_env)
                    .map_err(|_| ConfigError::MissingApiKey(api_key_env.clone()))?;
                let mut polygon = PolygonConfig::new(api_key);
                if let Some(url) = base_url {
                    polygon.base_url = url.clone();
                }
                let breaker = Arc::new(CircuitBreaker::default_provider());
                Ok(Box::new(PolygonProvider::new(polygon, breaker)?))
            }
        }
    }
}
