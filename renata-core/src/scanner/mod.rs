//! Scanner generation and compliance validation.

pub mod catalog;
pub mod definition;
pub mod generator;
pub mod validator;

pub use catalog::{CatalogError, SetupCatalog};
pub use definition::{
    AggregateInput, AggregateStage, PerTickerStage, RuleDefinition, SnapshotField, Stage,
    UniverseFilter, UniverseStage,
};
pub use generator::{generate, GenerateError, ScannerGenerator};
pub use validator::{validate, ComplianceCheck, ComplianceReport, Violation};
