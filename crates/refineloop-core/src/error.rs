use thiserror::Error;

use crate::{RunResult, RunStatus};

/// Fatal run errors. Guard aborts and cancellation are not errors; they come
/// back as an ordinary [`crate::RunResult`].
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] refineloop_critic::EvaluationError),

    #[error("Signal collection error: {0}")]
    Signal(#[from] refineloop_agent::SignalError),

    #[error("Invalid run status transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// A run that failed part way. `partial` keeps the history and cost
    /// accumulated before the failure; its status stays `Running`.
    #[error("Run failed after {} iteration(s): {source}", .partial.iterations)]
    Failed {
        source: Box<LoopError>,
        partial: Box<RunResult>,
    },
}

impl LoopError {
    /// The underlying failure, unwrapped from any partial-run context
    pub fn cause(&self) -> &LoopError {
        match self {
            LoopError::Failed { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Whatever the run completed before it failed
    pub fn partial(&self) -> Option<&RunResult> {
        match self {
            LoopError::Failed { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refineloop_critic::EvaluationError;

    #[test]
    fn test_cause_unwraps_partial_context() {
        let partial = RunResult {
            status: RunStatus::Running,
            final_quality: 0.3,
            iterations: 1,
            total_cost: 0.7,
            history: Vec::new(),
            abort_reason: None,
            halt_reason: None,
            cancelled: false,
            total_duration_secs: 0.1,
        };
        let err = LoopError::Failed {
            source: Box::new(LoopError::Evaluation(EvaluationError::InvalidWeights(
                "sum 0.9".into(),
            ))),
            partial: Box::new(partial),
        };

        assert!(matches!(
            err.cause(),
            LoopError::Evaluation(EvaluationError::InvalidWeights(_))
        ));
        assert_eq!(err.partial().unwrap().total_cost, 0.7);
        assert!(err.to_string().starts_with("Run failed after 1 iteration(s)"));
    }
}
