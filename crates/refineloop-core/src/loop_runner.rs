use chrono::Utc;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use refineloop_agent::{AgentConfig, AgentError, Artifact, RefinementAgent, SignalSource};
use refineloop_critic::{Decision, FeedbackPayload, HaltReason, QualityEvaluator, RunBudget};
use refineloop_logging::{LogEvent, Logger};

use crate::context::{IterationRecord, RunState};
use crate::error::LoopError;
use crate::guard::{GuardTrip, GuardVerdict, LoopGuard};
use crate::outcome::{RunResult, RunStatus};

/// Observer invoked after every completed iteration. It returns nothing and
/// cannot influence the loop.
///
/// It runs inline on the loop task. A panic is caught and logged, but a slow
/// callback delays the run, so hand heavy work off to a channel or task.
pub type IterationCallback = Arc<dyn Fn(&IterationRecord) + Send + Sync>;

/// How the run ended, before it is folded into a [`RunResult`]
struct Ending {
    status: RunStatus,
    halt_reason: Option<HaltReason>,
    abort_reason: Option<String>,
    cancelled: bool,
}

/// Drives the evaluate / guard / refine loop for a single artifact.
///
/// One orchestrator serves one run: [`FeedbackOrchestrator::run`] consumes it.
pub struct FeedbackOrchestrator<'a> {
    artifact: Artifact,
    budget: RunBudget,
    agent: &'a dyn RefinementAgent,
    signal_source: &'a dyn SignalSource,
    evaluator: QualityEvaluator,
    guard: LoopGuard,
    logger: Arc<Logger>,
    working_dir: PathBuf,
    on_iteration: Option<IterationCallback>,
    interrupted: Arc<AtomicBool>,
}

impl<'a> FeedbackOrchestrator<'a> {
    pub fn new(
        initial_artifact: Artifact,
        budget: RunBudget,
        agent: &'a dyn RefinementAgent,
        signal_source: &'a dyn SignalSource,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            artifact: initial_artifact,
            budget,
            agent,
            signal_source,
            evaluator: QualityEvaluator::default(),
            guard: LoopGuard::default(),
            logger,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            on_iteration: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_evaluator(mut self, evaluator: QualityEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_guard(mut self, guard: LoopGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_working_dir(mut self, working_dir: PathBuf) -> Self {
        self.working_dir = working_dir;
        self
    }

    pub fn with_iteration_callback(mut self, callback: IterationCallback) -> Self {
        self.on_iteration = Some(callback);
        self
    }

    pub fn budget(&self) -> &RunBudget {
        &self.budget
    }

    /// Get a handle to cancel the run between iterations
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Run the loop to a terminal state.
    ///
    /// A fatal failure part way through comes back as [`LoopError::Failed`],
    /// which still carries the history and cost gathered so far.
    pub async fn run(self) -> Result<RunResult, LoopError> {
        let mut state = RunState::new();

        self.logger.log(&LogEvent::RunStarted {
            agent: self.agent.name().to_string(),
            signal_source: self.signal_source.name().to_string(),
            artifact_len: self.artifact.len(),
            max_iterations: self.budget.max_iterations(),
            max_cost: self.budget.max_cost(),
            max_duration_secs: self.budget.max_duration().as_secs_f64(),
        });

        match self.drive(&mut state).await {
            Ok(ending) => self.finish(state, ending),
            Err(source) => Err(self.fail(state, source)),
        }
    }

    async fn drive(&self, state: &mut RunState) -> Result<Ending, LoopError> {
        let mut artifact = self.artifact.clone();
        let config = AgentConfig::new(self.working_dir.clone());

        // Cost and failure of the refinement that produced `artifact`
        let mut pending_cost = 0.0;
        let mut refinement_error: Option<String> = None;

        loop {
            if self.is_interrupted() {
                return Ok(self.cancel(state));
            }

            let iteration = state.iteration() + 1;

            // Evaluate the current candidate
            let signals = self.signal_source.collect(&artifact, &config).await?;
            let metrics = self.evaluator.evaluate(&signals)?;
            let feedback = self.evaluator.feedback(&metrics);
            let decision = self.evaluator.decide(&metrics, iteration, &self.budget);

            let record = IterationRecord {
                iteration,
                metrics,
                cost: pending_cost,
                timestamp: Utc::now(),
                feedback_sent: feedback.clone(),
                refinement_error: refinement_error.take(),
            };
            self.logger.log(&LogEvent::IterationEvaluated {
                iteration,
                overall_quality: record.overall_quality(),
                tests_passing: record.metrics.tests_passing(),
                cost: record.cost,
                total_cost: state.total_cost(),
            });
            state.push_record(record);
            self.notify(state);

            self.logger.log(&LogEvent::DecisionMade {
                iteration,
                decision: decision.short_description(),
            });

            if let Decision::Halt { reason, .. } = decision {
                return Ok(Ending {
                    status: RunStatus::HaltedSuccess,
                    halt_reason: Some(reason),
                    abort_reason: None,
                    cancelled: false,
                });
            }

            if let GuardVerdict::Abort(abort) =
                self.guard
                    .check(state.history(), &self.budget, state.elapsed())
            {
                self.logger.log(&LogEvent::GuardTripped {
                    iteration,
                    reason: abort.trip.to_string(),
                    detail: abort.detail.clone(),
                });
                let ending = if abort.trip == GuardTrip::IterationCap {
                    Ending {
                        status: RunStatus::HaltedSuccess,
                        halt_reason: Some(HaltReason::IterationCap),
                        abort_reason: None,
                        cancelled: false,
                    }
                } else {
                    Ending {
                        status: abort.trip.status(),
                        halt_reason: None,
                        abort_reason: Some(format!("{}: {}", abort.trip, abort.detail)),
                        cancelled: false,
                    }
                };
                return Ok(ending);
            }

            // Cancellation may have arrived from the callback or during the checks
            if self.is_interrupted() {
                return Ok(self.cancel(state));
            }

            // Refine, bounded by what is left of the time budget
            match self
                .refine(&artifact, &feedback, &config, iteration, state)
                .await
            {
                Ok(refinement) => {
                    debug!(iteration, cost = refinement.cost, "Refinement accepted");
                    state.add_cost(refinement.cost);
                    pending_cost = refinement.cost;
                    artifact = refinement.artifact;
                }
                Err(e) => {
                    warn!(
                        iteration,
                        error = %e,
                        "Refinement failed; re-evaluating unchanged artifact"
                    );
                    self.logger.log(&LogEvent::RefinementFailed {
                        iteration,
                        error: e.to_string(),
                    });
                    pending_cost = 0.0;
                    refinement_error = Some(e.to_string());
                }
            }
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn cancel(&self, state: &RunState) -> Ending {
        info!(iterations = state.iteration(), "Run cancelled by caller");
        self.logger.log(&LogEvent::RunCancelled {
            iterations: state.iteration(),
        });
        Ending {
            status: RunStatus::AbortedBudget,
            halt_reason: None,
            abort_reason: Some("cancelled by caller".to_string()),
            cancelled: true,
        }
    }

    async fn refine(
        &self,
        artifact: &Artifact,
        feedback: &FeedbackPayload,
        config: &AgentConfig,
        iteration: u32,
        state: &RunState,
    ) -> Result<refineloop_agent::Refinement, AgentError> {
        let remaining = self.budget.remaining_time(state.elapsed());
        self.logger.log(&LogEvent::RefinementStarted {
            iteration,
            timeout_secs: remaining.as_secs_f64(),
        });

        let call_config = config.clone().with_timeout(remaining);
        let refinement = tokio::time::timeout(
            remaining,
            self.agent.refine(artifact, feedback, &call_config),
        )
        .await
        .map_err(|_| AgentError::Timeout(remaining))??;

        self.logger.log(&LogEvent::RefinementCompleted {
            iteration,
            cost: refinement.cost,
            duration_secs: refinement.duration.as_secs_f64(),
            artifact_len: refinement.artifact.len(),
        });
        Ok(refinement)
    }

    fn notify(&self, state: &RunState) {
        if let (Some(callback), Some(record)) = (&self.on_iteration, state.latest()) {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(record))).is_err() {
                warn!(iteration = record.iteration, "Iteration callback panicked");
            }
        }
    }

    /// Wrap a fatal error with the partial result of the run
    fn fail(&self, state: RunState, source: LoopError) -> LoopError {
        let duration = state.elapsed();
        let final_quality = state
            .latest()
            .map(IterationRecord::overall_quality)
            .unwrap_or(0.0);
        let iterations = state.iteration();
        let total_cost = state.total_cost();
        let reason = source.to_string();

        self.logger.log(&LogEvent::RunFailed {
            iterations,
            total_cost,
            error: reason.clone(),
        });
        error!(iterations, total_cost, error = %reason, "Run failed");

        LoopError::Failed {
            partial: Box::new(RunResult {
                status: state.status(),
                final_quality,
                iterations,
                total_cost,
                history: state.into_history(),
                abort_reason: Some(reason),
                halt_reason: None,
                cancelled: false,
                total_duration_secs: duration.as_secs_f64(),
            }),
            source: Box::new(source),
        }
    }

    fn finish(&self, mut state: RunState, ending: Ending) -> Result<RunResult, LoopError> {
        state.finish(ending.status)?;

        let duration = state.elapsed();
        let final_quality = state
            .latest()
            .map(IterationRecord::overall_quality)
            .unwrap_or(0.0);
        let iterations = state.iteration();
        let total_cost = state.total_cost();

        self.logger.log(&LogEvent::RunFinished {
            status: ending.status.to_string(),
            iterations,
            final_quality,
            total_cost,
            duration_secs: duration.as_secs_f64(),
        });
        info!(
            status = %ending.status,
            iterations,
            final_quality,
            total_cost,
            "Run finished"
        );

        Ok(RunResult {
            status: ending.status,
            final_quality,
            iterations,
            total_cost,
            history: state.into_history(),
            abort_reason: ending.abort_reason,
            halt_reason: ending.halt_reason,
            cancelled: ending.cancelled,
            total_duration_secs: duration.as_secs_f64(),
        })
    }
}
