use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

use refineloop_critic::{FeedbackPayload, QualityMetrics};

use crate::{LoopError, RunStatus};

/// Record of a single completed iteration
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub iteration: u32,
    pub metrics: QualityMetrics,
    /// Cost of the refinement that produced the evaluated artifact
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
    pub feedback_sent: FeedbackPayload,
    /// Set when the preceding refinement failed and the artifact was re-evaluated unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement_error: Option<String>,
}

impl IterationRecord {
    pub fn overall_quality(&self) -> f64 {
        self.metrics.overall_quality()
    }

    pub fn feedback_fingerprint(&self) -> String {
        self.feedback_sent.fingerprint()
    }
}

/// Mutable state of one run. Owned by the orchestrator, which is its only writer.
#[derive(Debug)]
pub struct RunState {
    status: RunStatus,
    history: Vec<IterationRecord>,
    started_at: Instant,
    total_cost: f64,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            status: RunStatus::Running,
            history: Vec::new(),
            started_at: Instant::now(),
            total_cost: 0.0,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn latest(&self) -> Option<&IterationRecord> {
        self.history.last()
    }

    /// Number of completed iterations
    pub fn iteration(&self) -> u32 {
        self.history.len() as u32
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Charge a refinement to the run
    pub fn add_cost(&mut self, cost: f64) {
        self.total_cost += cost;
    }

    pub fn push_record(&mut self, record: IterationRecord) {
        self.history.push(record);
    }

    /// Move to a terminal status. Terminal states are final.
    pub fn finish(&mut self, status: RunStatus) -> Result<(), LoopError> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(LoopError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        Ok(())
    }

    pub fn into_history(self) -> Vec<IterationRecord> {
        self.history
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
