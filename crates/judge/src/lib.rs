//! Judge layer - rule-based evaluation of step results.
//!
//! An ordered rule collection produces a [`cadence_core::Judgment`] for
//! each executed step; unmatched results go to a pluggable fallback or
//! a conservative default.

#![warn(missing_docs)]

pub mod judge;
pub mod rule;

pub use judge::{FallbackEvaluator, Judge};
pub use rule::{Condition, Field, Rule};
