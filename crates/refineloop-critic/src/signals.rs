use serde::{Deserialize, Serialize};

/// Raw, unvalidated measurements gathered from the external signal sources.
///
/// Counts are signed on purpose: a misbehaving source that reports a negative
/// count must surface as [`crate::EvaluationError::InvalidMetrics`] instead of
/// a deserialization failure somewhere upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSignals {
    #[serde(default)]
    pub tests: TestSignals,
    #[serde(default)]
    pub quality: CodeQualitySignals,
    #[serde(default)]
    pub security: SecuritySignals,
    #[serde(default)]
    pub types: TypeSignals,
    #[serde(default)]
    pub docs: DocSignals,
}

/// Test runner output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSignals {
    pub test_count: i64,
    pub failed_test_count: i64,
    /// Line coverage (0.0 - 1.0)
    pub coverage: f64,
}

/// Static analyzer output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeQualitySignals {
    /// Normalized analyzer score (0.0 - 1.0)
    pub score: f64,
    pub complexity: i64,
    pub duplication_ratio: f64,
}

/// Security scanner output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySignals {
    pub score: f64,
    pub vulnerability_count: i64,
}

impl Default for SecuritySignals {
    fn default() -> Self {
        Self {
            score: 1.0,
            vulnerability_count: 0,
        }
    }
}

/// Type checker output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSignals {
    pub coverage: f64,
    pub error_count: i64,
}

/// Documentation checker output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocSignals {
    pub coverage: f64,
}

impl RawSignals {
    /// Tests pass when at least one test ran and none failed.
    pub fn tests_passing(&self) -> bool {
        self.tests.test_count > 0 && self.tests.failed_test_count == 0
    }

    /// Parse signals from a JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_groups_use_defaults() {
        let json = r#"{"tests": {"test_count": 4, "failed_test_count": 0, "coverage": 0.5}}"#;
        let signals = RawSignals::from_json(json).unwrap();
        assert!(signals.tests_passing());
        assert_eq!(signals.security.score, 1.0);
        assert_eq!(signals.docs.coverage, 0.0);
    }

    #[test]
    fn test_no_tests_is_not_passing() {
        let signals = RawSignals::default();
        assert!(!signals.tests_passing());
    }

    #[test]
    fn test_failures_are_not_passing() {
        let mut signals = RawSignals::default();
        signals.tests.test_count = 10;
        signals.tests.failed_test_count = 1;
        assert!(!signals.tests_passing());
    }
}
