use serde::{Deserialize, Serialize};

use refineloop_critic::HaltReason;

use crate::IterationRecord;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    HaltedSuccess,
    AbortedBudget,
    AbortedStagnant,
    AbortedDegrading,
    AbortedLowQuality,
    AbortedCycling,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn is_aborted(&self) -> bool {
        self.is_terminal() && !matches!(self, RunStatus::HaltedSuccess)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::HaltedSuccess => "halted_success",
            RunStatus::AbortedBudget => "aborted_budget",
            RunStatus::AbortedStagnant => "aborted_stagnant",
            RunStatus::AbortedDegrading => "aborted_degrading",
            RunStatus::AbortedLowQuality => "aborted_low_quality",
            RunStatus::AbortedCycling => "aborted_cycling",
        };
        f.write_str(name)
    }
}

/// The final outcome of a run. Every run produces one, including aborted and
/// cancelled runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub final_quality: f64,
    pub iterations: u32,
    pub total_cost: f64,
    pub history: Vec<IterationRecord>,
    pub abort_reason: Option<String>,
    /// Why the run halted; `IterationCap` marks a forced halt
    pub halt_reason: Option<HaltReason>,
    /// The caller cancelled the run between iterations
    pub cancelled: bool,
    pub total_duration_secs: f64,
}

/// [`RunResult`] without its history, for compact reporting
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub status: RunStatus,
    pub final_quality: f64,
    pub iterations: u32,
    pub total_cost: f64,
    pub abort_reason: Option<&'a str>,
    pub halt_reason: Option<HaltReason>,
    pub cancelled: bool,
    pub total_duration_secs: f64,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::HaltedSuccess
    }

    /// Halted only because the iteration budget ran out
    pub fn is_forced_halt(&self) -> bool {
        self.halt_reason.is_some_and(|r| r.is_forced())
    }

    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            status: self.status,
            final_quality: self.final_quality,
            iterations: self.iterations,
            total_cost: self.total_cost,
            abort_reason: self.abort_reason.as_deref(),
            halt_reason: self.halt_reason,
            cancelled: self.cancelled,
            total_duration_secs: self.total_duration_secs,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            return 130;
        }
        match self.status {
            RunStatus::HaltedSuccess if self.is_forced_halt() => 1,
            RunStatus::HaltedSuccess => 0,
            RunStatus::AbortedBudget => 2,
            RunStatus::AbortedStagnant => 3,
            RunStatus::AbortedDegrading => 4,
            RunStatus::AbortedLowQuality => 5,
            RunStatus::AbortedCycling => 6,
            RunStatus::Running => 70,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: RunStatus, halt_reason: Option<HaltReason>, cancelled: bool) -> RunResult {
        RunResult {
            status,
            final_quality: 0.5,
            iterations: 2,
            total_cost: 1.0,
            history: Vec::new(),
            abort_reason: None,
            halt_reason,
            cancelled,
            total_duration_secs: 0.1,
        }
    }

    #[test]
    fn test_status_terminality() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::HaltedSuccess.is_terminal());
        assert!(!RunStatus::HaltedSuccess.is_aborted());
        assert!(RunStatus::AbortedCycling.is_aborted());
    }

    #[test]
    fn test_exit_codes_distinguish_outcomes() {
        let earned = result(
            RunStatus::HaltedSuccess,
            Some(HaltReason::QualitySufficient),
            false,
        );
        let forced = result(RunStatus::HaltedSuccess, Some(HaltReason::IterationCap), false);
        let budget = result(RunStatus::AbortedBudget, None, false);
        let cancelled = result(RunStatus::AbortedBudget, None, true);

        assert_eq!(earned.exit_code(), 0);
        assert!(forced.is_forced_halt());
        assert_eq!(forced.exit_code(), 1);
        assert_eq!(budget.exit_code(), 2);
        assert_eq!(cancelled.exit_code(), 130);
    }

    #[test]
    fn test_summary_serializes_without_history() {
        let r = result(RunStatus::AbortedStagnant, None, false);
        let json = serde_json::to_value(r.summary()).unwrap();
        assert_eq!(json["status"], "aborted_stagnant");
        assert!(json.get("history").is_none());
    }
}
