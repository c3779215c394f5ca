//! Evaluation: tier types, the per-segment classifier and the aggregator.

pub mod aggregate;
pub mod classify;
pub mod decision;

pub use aggregate::aggregate;
pub use classify::{Classifier, NO_RULE_REASON};
pub use decision::{ClassificationResult, Decision, Tier};
