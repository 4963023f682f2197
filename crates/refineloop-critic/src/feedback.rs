use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CheckKind, QualityMetrics, QualityWeights};

/// A weighted check that did not reach its maximum score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingCheck {
    pub check: CheckKind,
    /// Observed score (0.0 - 1.0)
    pub observed: f64,
    pub weight: f64,
    /// Quality points lost to this check: `weight * (1 - observed)`
    pub lost_quality: f64,
}

/// A discrete problem the refinement agent should fix regardless of weighting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum Blocker {
    FailingTests(u64),
    Vulnerabilities(u64),
    TypeErrors(u64),
    NoTests,
}

impl std::fmt::Display for Blocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Blocker::FailingTests(n) => write!(f, "{} failing test(s)", n),
            Blocker::Vulnerabilities(n) => write!(f, "{} known vulnerability(ies)", n),
            Blocker::TypeErrors(n) => write!(f, "{} type error(s)", n),
            Blocker::NoTests => f.write_str("no tests were run"),
        }
    }
}

/// Structured diagnosis handed to the refinement agent.
///
/// Checks are ranked by how much quality they cost, largest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub overall_quality: f64,
    pub failing_checks: Vec<FailingCheck>,
    pub blockers: Vec<Blocker>,
}

impl FeedbackPayload {
    pub fn from_metrics(metrics: &QualityMetrics, weights: &QualityWeights) -> Self {
        let mut failing_checks: Vec<FailingCheck> = CheckKind::ALL
            .iter()
            .filter_map(|check| {
                let observed = metrics.score(*check);
                let weight = weights.weight(*check);
                if observed >= 1.0 {
                    return None;
                }
                Some(FailingCheck {
                    check: *check,
                    observed,
                    weight,
                    lost_quality: weight * (1.0 - observed),
                })
            })
            .collect();
        // Stable sort keeps CheckKind order for equal losses
        failing_checks.sort_by(|a, b| b.lost_quality.total_cmp(&a.lost_quality));

        let mut blockers = Vec::new();
        if metrics.test_count() == 0 {
            blockers.push(Blocker::NoTests);
        }
        if metrics.failed_test_count() > 0 {
            blockers.push(Blocker::FailingTests(metrics.failed_test_count()));
        }
        if metrics.vulnerability_count() > 0 {
            blockers.push(Blocker::Vulnerabilities(metrics.vulnerability_count()));
        }
        if metrics.type_error_count() > 0 {
            blockers.push(Blocker::TypeErrors(metrics.type_error_count()));
        }

        Self {
            overall_quality: metrics.overall_quality(),
            failing_checks,
            blockers,
        }
    }

    /// Hex SHA-256 of the canonical JSON form. Equal fingerprints mean the
    /// payloads are structurally identical.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    pub fn is_clean(&self) -> bool {
        self.failing_checks.is_empty() && self.blockers.is_empty()
    }

    /// Render the payload as plain text for agents that take prompts
    pub fn to_prompt(&self) -> String {
        let mut out = format!("Overall quality: {:.3}\n", self.overall_quality);
        if !self.blockers.is_empty() {
            out.push_str("\nBlockers:\n");
            for blocker in &self.blockers {
                out.push_str(&format!("- {}\n", blocker));
            }
        }
        if !self.failing_checks.is_empty() {
            out.push_str("\nChecks below target (largest impact first):\n");
            for check in &self.failing_checks {
                out.push_str(&format!(
                    "- {}: {:.2} (weight {:.2}, costs {:.3})\n",
                    check.check, check.observed, check.weight, check.lost_quality
                ));
            }
        }
        out
    }
}
