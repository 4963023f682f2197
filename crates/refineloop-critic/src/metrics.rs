use serde::{Deserialize, Serialize};

use crate::{EvaluationError, RawSignals};

/// Tolerance used when checking that a weight set sums to 1.0
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// The weighted signals that make up `overall_quality`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    TestsPassing,
    TestCoverage,
    Security,
    CodeQuality,
    TypeCoverage,
    DocCoverage,
}

impl CheckKind {
    pub const ALL: [CheckKind; 6] = [
        CheckKind::TestsPassing,
        CheckKind::TestCoverage,
        CheckKind::Security,
        CheckKind::CodeQuality,
        CheckKind::TypeCoverage,
        CheckKind::DocCoverage,
    ];
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CheckKind::TestsPassing => "tests_passing",
            CheckKind::TestCoverage => "test_coverage",
            CheckKind::Security => "security",
            CheckKind::CodeQuality => "code_quality",
            CheckKind::TypeCoverage => "type_coverage",
            CheckKind::DocCoverage => "doc_coverage",
        };
        f.write_str(name)
    }
}

/// Weights applied to each signal when computing `overall_quality`.
///
/// Functional correctness is weighted above polish. Custom sets must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityWeights {
    pub tests_passing: f64,
    pub test_coverage: f64,
    pub security: f64,
    pub code_quality: f64,
    pub type_coverage: f64,
    pub doc_coverage: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            tests_passing: 0.30,
            test_coverage: 0.25,
            security: 0.20,
            code_quality: 0.15,
            type_coverage: 0.05,
            doc_coverage: 0.05,
        }
    }
}

impl QualityWeights {
    pub fn weight(&self, check: CheckKind) -> f64 {
        match check {
            CheckKind::TestsPassing => self.tests_passing,
            CheckKind::TestCoverage => self.test_coverage,
            CheckKind::Security => self.security,
            CheckKind::CodeQuality => self.code_quality,
            CheckKind::TypeCoverage => self.type_coverage,
            CheckKind::DocCoverage => self.doc_coverage,
        }
    }

    /// Ensure every weight is in [0, 1] and the set sums to 1.0
    pub fn validate(&self) -> Result<(), EvaluationError> {
        for check in CheckKind::ALL {
            let weight = self.weight(check);
            if !(0.0..=1.0).contains(&weight) {
                return Err(EvaluationError::InvalidWeights(format!(
                    "weight for {} is {}, expected a value in [0, 1]",
                    check, weight
                )));
            }
        }

        let sum: f64 = CheckKind::ALL.iter().map(|c| self.weight(*c)).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EvaluationError::InvalidWeights(format!(
                "weights sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }
}

/// Validated quality measurements for one candidate artifact.
///
/// Only constructible from [`RawSignals`], which guarantees every ratio is in
/// [0, 1], every count is non-negative, and `overall_quality` is derived rather
/// than supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    test_coverage: f64,
    tests_passing: bool,
    test_count: u64,
    failed_test_count: u64,
    code_quality_score: f64,
    complexity: u64,
    duplication_ratio: f64,
    security_score: f64,
    vulnerability_count: u64,
    type_coverage: f64,
    type_error_count: u64,
    doc_coverage: f64,
    overall_quality: f64,
}

impl QualityMetrics {
    /// Validate raw signals and derive `overall_quality` with the given weights
    pub fn from_signals(
        signals: &RawSignals,
        weights: &QualityWeights,
    ) -> Result<Self, EvaluationError> {
        let test_count = count("test_count", signals.tests.test_count)?;
        let failed_test_count = count("failed_test_count", signals.tests.failed_test_count)?;
        if failed_test_count > test_count {
            return Err(EvaluationError::InvalidMetrics {
                field: "failed_test_count",
                reason: format!(
                    "{} failed tests reported out of {} total",
                    failed_test_count, test_count
                ),
            });
        }

        let mut metrics = Self {
            test_coverage: ratio("test_coverage", signals.tests.coverage)?,
            tests_passing: signals.tests_passing(),
            test_count,
            failed_test_count,
            code_quality_score: ratio("code_quality_score", signals.quality.score)?,
            complexity: count("complexity", signals.quality.complexity)?,
            duplication_ratio: ratio("duplication_ratio", signals.quality.duplication_ratio)?,
            security_score: ratio("security_score", signals.security.score)?,
            vulnerability_count: count(
                "vulnerability_count",
                signals.security.vulnerability_count,
            )?,
            type_coverage: ratio("type_coverage", signals.types.coverage)?,
            type_error_count: count("type_error_count", signals.types.error_count)?,
            doc_coverage: ratio("doc_coverage", signals.docs.coverage)?,
            overall_quality: 0.0,
        };
        metrics.overall_quality = metrics.weighted_sum(weights);
        Ok(metrics)
    }

    /// Score in [0, 1] contributed by a single weighted check
    pub fn score(&self, check: CheckKind) -> f64 {
        match check {
            CheckKind::TestsPassing => {
                if self.tests_passing {
                    1.0
                } else {
                    0.0
                }
            }
            CheckKind::TestCoverage => self.test_coverage,
            CheckKind::Security => self.security_score,
            CheckKind::CodeQuality => self.code_quality_score,
            CheckKind::TypeCoverage => self.type_coverage,
            CheckKind::DocCoverage => self.doc_coverage,
        }
    }

    fn weighted_sum(&self, weights: &QualityWeights) -> f64 {
        let sum: f64 = CheckKind::ALL
            .iter()
            .map(|check| weights.weight(*check) * self.score(*check))
            .sum();
        // Float rounding can land a hair outside [0, 1] on perfect inputs
        sum.clamp(0.0, 1.0)
    }

    pub fn overall_quality(&self) -> f64 {
        self.overall_quality
    }

    pub fn tests_passing(&self) -> bool {
        self.tests_passing
    }

    pub fn test_coverage(&self) -> f64 {
        self.test_coverage
    }

    pub fn test_count(&self) -> u64 {
        self.test_count
    }

    pub fn failed_test_count(&self) -> u64 {
        self.failed_test_count
    }

    pub fn code_quality_score(&self) -> f64 {
        self.code_quality_score
    }

    pub fn complexity(&self) -> u64 {
        self.complexity
    }

    pub fn duplication_ratio(&self) -> f64 {
        self.duplication_ratio
    }

    pub fn security_score(&self) -> f64 {
        self.security_score
    }

    pub fn vulnerability_count(&self) -> u64 {
        self.vulnerability_count
    }

    pub fn type_coverage(&self) -> f64 {
        self.type_coverage
    }

    pub fn type_error_count(&self) -> u64 {
        self.type_error_count
    }

    pub fn doc_coverage(&self) -> f64 {
        self.doc_coverage
    }
}

fn ratio(field: &'static str, value: f64) -> Result<f64, EvaluationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(EvaluationError::InvalidMetrics {
            field,
            reason: format!("{} is outside [0, 1]", value),
        })
    }
}

fn count(field: &'static str, value: i64) -> Result<u64, EvaluationError> {
    u64::try_from(value).map_err(|_| EvaluationError::InvalidMetrics {
        field,
        reason: format!("{} is negative", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> RawSignals {
        let mut signals = RawSignals::default();
        signals.tests.test_count = 12;
        signals.tests.coverage = 0.80;
        signals.quality.score = 0.90;
        signals.security.score = 1.0;
        signals.types.coverage = 1.0;
        signals.docs.coverage = 1.0;
        signals
    }

    #[test]
    fn test_overall_quality_uses_weights() {
        let metrics = QualityMetrics::from_signals(&signals(), &QualityWeights::default()).unwrap();
        // 0.30 + 0.25*0.80 + 0.20 + 0.15*0.90 + 0.05 + 0.05
        assert!((metrics.overall_quality() - 0.935).abs() < 1e-9);
        assert!(metrics.tests_passing());
    }

    #[test]
    fn test_perfect_signals_stay_within_bounds() {
        let mut perfect = signals();
        perfect.tests.coverage = 1.0;
        perfect.quality.score = 1.0;
        let metrics = QualityMetrics::from_signals(&perfect, &QualityWeights::default()).unwrap();
        assert!(metrics.overall_quality() <= 1.0);
        assert!((metrics.overall_quality() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_out_of_range_ratio() {
        let mut bad = signals();
        bad.tests.coverage = 1.2;
        let err = QualityMetrics::from_signals(&bad, &QualityWeights::default()).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::InvalidMetrics {
                field: "test_coverage",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_nan_ratio() {
        let mut bad = signals();
        bad.security.score = f64::NAN;
        assert!(QualityMetrics::from_signals(&bad, &QualityWeights::default()).is_err());
    }

    #[test]
    fn test_rejects_negative_count() {
        let mut bad = signals();
        bad.security.vulnerability_count = -1;
        let err = QualityMetrics::from_signals(&bad, &QualityWeights::default()).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::InvalidMetrics {
                field: "vulnerability_count",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_more_failures_than_tests() {
        let mut bad = signals();
        bad.tests.failed_test_count = 13;
        assert!(QualityMetrics::from_signals(&bad, &QualityWeights::default()).is_err());
    }

    #[test]
    fn test_default_weights_are_valid() {
        assert!(QualityWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = QualityWeights {
            tests_passing: 0.5,
            ..QualityWeights::default()
        };
        assert!(matches!(
            weights.validate(),
            Err(EvaluationError::InvalidWeights(_))
        ));
    }
}
