//! # refineloop-critic
//!
//! Quality evaluation for the refineloop feedback loop.
//!
//! Turns raw signals into validated [`QualityMetrics`], derives the scalar
//! `overall_quality`, and decides whether to HALT or CONTINUE.
//!
//! ## Key Types
//!
//! - [`QualityEvaluator`] - Scoring and halting decisions
//! - [`RunBudget`] - Iteration, cost and time limits for a run
//! - [`FeedbackPayload`] - Ranked diagnosis handed to the refinement agent

mod budget;
mod decision;
pub mod evaluator;
mod feedback;
mod metrics;
mod signals;

pub use budget::{BudgetError, RunBudget};
pub use decision::{Decision, HaltReason};
pub use evaluator::{EvaluationError, QualityEvaluator, EARLY_EXIT_QUALITY};
pub use feedback::{Blocker, FailingCheck, FeedbackPayload};
pub use metrics::{CheckKind, QualityMetrics, QualityWeights};
pub use signals::{
    CodeQualitySignals, DocSignals, RawSignals, SecuritySignals, TestSignals, TypeSignals,
};
