//! Renata Core — scanner generation, validation and evaluation primitives.
//!
//! This crate contains everything needed to turn a named setup and a
//! parameter set into a checked, executable scanner:
//! - Domain types (bars, parameter sets, setup descriptors, signals)
//! - Market data providers (in-memory, synthetic, Parquet cache, HTTP)
//! - Indicator engine with explicit lookbacks and masked warmup
//! - Rule evaluation (molds, conditions, operands)
//! - Setup catalog, scanner generator and compliance validator
//!
//! Running a rule over tickers and dates lives in `renata-runner`.

pub mod data;
pub mod domain;
pub mod indicators;
pub mod rules;
pub mod scanner;
