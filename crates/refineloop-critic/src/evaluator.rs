use tracing::debug;

use crate::{
    Decision, FeedbackPayload, HaltReason, QualityMetrics, QualityWeights, RawSignals, RunBudget,
};

/// Minimum quality for the tests-passing early exit
pub const EARLY_EXIT_QUALITY: f64 = 0.75;

/// Scores candidates and decides whether refining further is worthwhile.
///
/// Pure: no I/O, no clock, no shared state.
#[derive(Debug, Clone, Default)]
pub struct QualityEvaluator {
    weights: QualityWeights,
}

impl QualityEvaluator {
    pub fn new(weights: QualityWeights) -> Result<Self, EvaluationError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    /// Validate raw signals into metrics. Out-of-range input is an error, never clamped.
    pub fn evaluate(&self, signals: &RawSignals) -> Result<QualityMetrics, EvaluationError> {
        let metrics = QualityMetrics::from_signals(signals, &self.weights)?;
        debug!(
            overall_quality = metrics.overall_quality(),
            tests_passing = metrics.tests_passing(),
            "Evaluated candidate"
        );
        Ok(metrics)
    }

    /// Value of stopping now
    pub fn halt_value(metrics: &QualityMetrics) -> f64 {
        metrics.overall_quality()
    }

    /// Value of refining again; always `1 - halt_value`
    pub fn continue_value(metrics: &QualityMetrics) -> f64 {
        1.0 - Self::halt_value(metrics)
    }

    /// Decide HALT or CONTINUE for `iteration` (1-based). First matching rule wins:
    /// halting beats continuing, then the iteration cap, then the early exit.
    pub fn decide(&self, metrics: &QualityMetrics, iteration: u32, budget: &RunBudget) -> Decision {
        let halt_value = Self::halt_value(metrics);
        let continue_value = Self::continue_value(metrics);

        let reason = if halt_value > continue_value {
            Some(HaltReason::QualitySufficient)
        } else if iteration >= budget.max_iterations() {
            Some(HaltReason::IterationCap)
        } else if metrics.tests_passing() && halt_value >= EARLY_EXIT_QUALITY {
            Some(HaltReason::EarlyExit)
        } else {
            None
        };

        let decision = match reason {
            Some(reason) => Decision::Halt {
                reason,
                halt_value,
                continue_value,
            },
            None => Decision::Continue {
                halt_value,
                continue_value,
            },
        };
        debug!(iteration, decision = %decision.short_description(), "Evaluator decision");
        decision
    }

    /// Build the structured diagnosis for the refinement agent
    pub fn feedback(&self, metrics: &QualityMetrics) -> FeedbackPayload {
        FeedbackPayload::from_metrics(metrics, &self.weights)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("Invalid metrics: {field}: {reason}")]
    InvalidMetrics { field: &'static str, reason: String },

    #[error("Invalid quality weights: {0}")]
    InvalidWeights(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn budget(max_iterations: u32) -> RunBudget {
        RunBudget::new(max_iterations, 10.0, Duration::from_secs(600)).unwrap()
    }

    fn signals(
        passing: bool,
        coverage: f64,
        security: f64,
        quality: f64,
        types: f64,
        docs: f64,
    ) -> RawSignals {
        let mut signals = RawSignals::default();
        signals.tests.test_count = 20;
        signals.tests.failed_test_count = if passing { 0 } else { 3 };
        signals.tests.coverage = coverage;
        signals.security.score = security;
        signals.quality.score = quality;
        signals.types.coverage = types;
        signals.docs.coverage = docs;
        signals
    }

    #[test]
    fn test_halting_values_sum_to_one() {
        let evaluator = QualityEvaluator::default();
        let steps = [0.0, 0.013, 0.1, 0.2, 0.3337, 0.49, 0.5, 0.61, 0.777, 0.9, 0.999, 1.0];
        for coverage in steps {
            for security in steps {
                let metrics = evaluator
                    .evaluate(&signals(coverage > 0.5, coverage, security, 0.3, 0.7, coverage))
                    .unwrap();
                let sum = QualityEvaluator::halt_value(&metrics)
                    + QualityEvaluator::continue_value(&metrics);
                assert_eq!(sum, 1.0);
            }
        }
    }

    #[test]
    fn test_high_quality_halts_on_first_iteration() {
        let evaluator = QualityEvaluator::default();
        let metrics = evaluator
            .evaluate(&signals(true, 0.80, 1.0, 0.90, 1.0, 1.0))
            .unwrap();
        assert!((metrics.overall_quality() - 0.935).abs() < 1e-9);

        let decision = evaluator.decide(&metrics, 1, &budget(10));
        assert_eq!(decision.halt_reason(), Some(HaltReason::QualitySufficient));
        assert!(!decision.halt_reason().unwrap().is_forced());
    }

    #[test]
    fn test_low_quality_continues_below_cap() {
        let evaluator = QualityEvaluator::default();
        let metrics = evaluator
            .evaluate(&signals(false, 0.4, 0.5, 0.5, 0.5, 0.5))
            .unwrap();
        assert!(evaluator.decide(&metrics, 1, &budget(5)).is_continue());
    }

    #[test]
    fn test_cap_forces_halt() {
        let evaluator = QualityEvaluator::default();
        let metrics = evaluator
            .evaluate(&signals(false, 0.4, 0.5, 0.5, 0.5, 0.5))
            .unwrap();
        let decision = evaluator.decide(&metrics, 2, &budget(2));
        assert_eq!(decision.halt_reason(), Some(HaltReason::IterationCap));
        assert!(decision.halt_reason().unwrap().is_forced());
    }

    #[test]
    fn test_exact_tie_does_not_halt() {
        // Only tests_passing contributes: weight 0.5 gives Q(HALT) == Q(CONTINUE)
        let weights = QualityWeights {
            tests_passing: 0.5,
            test_coverage: 0.5,
            security: 0.0,
            code_quality: 0.0,
            type_coverage: 0.0,
            doc_coverage: 0.0,
        };
        let evaluator = QualityEvaluator::new(weights).unwrap();
        let metrics = evaluator
            .evaluate(&signals(true, 0.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(QualityEvaluator::halt_value(&metrics), 0.5);
        assert!(evaluator.decide(&metrics, 1, &budget(5)).is_continue());
    }

    #[test]
    fn test_invalid_signals_rejected() {
        let evaluator = QualityEvaluator::default();
        let err = evaluator
            .evaluate(&signals(true, -0.1, 1.0, 1.0, 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidMetrics { .. }));
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let weights = QualityWeights {
            doc_coverage: 0.5,
            ..QualityWeights::default()
        };
        assert!(QualityEvaluator::new(weights).is_err());
    }
}
