//! Scanner rule evaluation.
//!
//! A mold is a conjunction of conditions over operands. Operands read the
//! evaluated ticker's own precomputed series, parameters or constants.
//! Evaluation is a pure function of (ticker context, bar index, params).

pub mod condition;
pub mod mold;

pub use condition::{Comparator, Condition, Operand};
pub use mold::{EvalError, Mold, MoldOutcome, TickerContext};
