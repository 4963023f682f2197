use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::AgentError;

/// The candidate being refined
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact {
    content: String,
}

impl Artifact {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A successful refinement: the new candidate and what producing it cost
#[derive(Debug, Clone)]
pub struct Refinement {
    pub artifact: Artifact,
    pub cost: f64,
    pub duration: Duration,
}

impl Refinement {
    /// Rejects negative or non-finite costs
    pub fn new(artifact: Artifact, cost: f64, duration: Duration) -> Result<Self, AgentError> {
        if !cost.is_finite() || cost < 0.0 {
            return Err(AgentError::InvalidOutput(format!(
                "cost must be a non-negative number, got {}",
                cost
            )));
        }
        Ok(Self {
            artifact,
            cost,
            duration,
        })
    }
}

/// Output captured from a collaborator process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Combined stdout output
    pub stdout: String,
    /// Combined stderr output
    pub stderr: String,
    /// Exit code from the process
    pub exit_code: i32,
    /// Duration of execution
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            duration,
        }
    }

    /// Check if the process exited successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last few stderr lines, for error messages
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refinement_rejects_bad_cost() {
        let artifact = Artifact::new("fn main() {}");
        assert!(Refinement::new(artifact.clone(), -0.5, Duration::ZERO).is_err());
        assert!(Refinement::new(artifact.clone(), f64::NAN, Duration::ZERO).is_err());
        assert!(Refinement::new(artifact, 0.0, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_stderr_tail() {
        let output = ProcessOutput::new(
            String::new(),
            "one\ntwo\nthree".to_string(),
            1,
            Duration::ZERO,
        );
        assert!(!output.success());
        assert_eq!(output.stderr_tail(2), "two\nthree");
        assert_eq!(output.stderr_tail(10), "one\ntwo\nthree");
    }

    #[test]
    fn test_artifact_serializes_as_string() {
        let json = serde_json::to_string(&Artifact::new("draft")).unwrap();
        assert_eq!(json, "\"draft\"");
    }
}
