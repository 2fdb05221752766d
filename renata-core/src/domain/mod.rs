//! Domain types for the scanner core.

pub mod bar;
pub mod params;
pub mod setup;
pub mod signal;

pub use bar::Bar;
pub use params::{ParamValue, ParameterSet};
pub use setup::{SetupDescriptor, Timeframe};
pub use signal::Signal;

/// Ticker symbol.
pub type Ticker = String;
