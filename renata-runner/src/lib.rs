//! Renata Runner — scan orchestration on top of `renata-core`.
//!
//! - Scan configuration (TOML) with explicit provider selection
//! - Execution runner: per-date universe → parallel per-ticker → aggregate
//! - Result aggregation with skip accounting
//! - JSON / CSV export

pub mod aggregate;
pub mod config;
pub mod export;
pub mod runner;

pub use aggregate::{ExecutionResult, ResultAggregator, ScanSummary, SkippedEvaluation};
pub use config::{ConfigError, ProviderConfig, RunId, ScanConfig};
pub use runner::{
    execute, execute_with_cancel, run_scan, CancelToken, ExecuteError, RunError, ScanReport,
};
