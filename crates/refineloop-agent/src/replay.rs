use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use refineloop_critic::{FeedbackPayload, RawSignals};

use crate::{
    AgentConfig, AgentError, Artifact, Refinement, RefinementAgent, SignalError, SignalSource,
};

/// One scripted answer from a [`ReplayAgent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplayStep {
    /// Return `artifact` at `cost`
    Refined { artifact: String, cost: f64 },
    /// Fail the call with `reason`
    Failed { reason: String },
    /// Never answer; only a timeout ends the call
    Hang,
}

/// Refinement agent that plays back a fixed script, one step per call.
///
/// Calls past the end of the script fail, so a run driven by a short script
/// still terminates through the guard.
pub struct ReplayAgent {
    steps: Mutex<VecDeque<ReplayStep>>,
    feedback_seen: Mutex<Vec<FeedbackPayload>>,
}

impl ReplayAgent {
    pub fn new(steps: impl IntoIterator<Item = ReplayStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            feedback_seen: Mutex::new(Vec::new()),
        }
    }

    /// Feedback payloads received so far, in call order
    pub fn feedback_seen(&self) -> Vec<FeedbackPayload> {
        self.feedback_seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    /// Steps not yet played
    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|steps| steps.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RefinementAgent for ReplayAgent {
    fn name(&self) -> &str {
        "replay"
    }

    async fn refine(
        &self,
        _artifact: &Artifact,
        feedback: &FeedbackPayload,
        _config: &AgentConfig,
    ) -> Result<Refinement, AgentError> {
        if let Ok(mut seen) = self.feedback_seen.lock() {
            seen.push(feedback.clone());
        }

        let step = self
            .steps
            .lock()
            .map_err(|_| AgentError::ExecutionFailed("replay script lock poisoned".into()))?
            .pop_front();

        debug!(step = ?step, "Replaying refinement step");
        match step {
            Some(ReplayStep::Refined { artifact, cost }) => {
                Refinement::new(Artifact::new(artifact), cost, Duration::ZERO)
            }
            Some(ReplayStep::Failed { reason }) => Err(AgentError::RefinementFailed(reason)),
            Some(ReplayStep::Hang) => {
                std::future::pending::<()>().await;
                Err(AgentError::ExecutionFailed("hang step resumed".into()))
            }
            None => Err(AgentError::RefinementFailed(
                "replay script exhausted".into(),
            )),
        }
    }
}

/// Signal source that looks signals up by artifact content
pub struct ReplaySignalSource {
    signals: HashMap<String, RawSignals>,
}

impl ReplaySignalSource {
    pub fn new(signals: HashMap<String, RawSignals>) -> Self {
        Self { signals }
    }

    pub fn with_signals(mut self, artifact: impl Into<String>, signals: RawSignals) -> Self {
        self.signals.insert(artifact.into(), signals);
        self
    }
}

#[async_trait]
impl SignalSource for ReplaySignalSource {
    fn name(&self) -> &str {
        "replay"
    }

    async fn collect(
        &self,
        artifact: &Artifact,
        _config: &AgentConfig,
    ) -> Result<RawSignals, SignalError> {
        self.signals
            .get(artifact.content())
            .cloned()
            .ok_or_else(|| SignalError::UnknownArtifact(artifact.content().to_string()))
    }
}

/// A complete scripted scenario: the starting artifact, the signals for every
/// artifact the script can produce, and the refinement steps in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayScript {
    pub initial_artifact: String,
    pub signals: HashMap<String, RawSignals>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Split into the collaborators that play the script back
    pub fn into_parts(self) -> (Artifact, ReplayAgent, ReplaySignalSource) {
        (
            Artifact::new(self.initial_artifact),
            ReplayAgent::new(self.steps),
            ReplaySignalSource::new(self.signals),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refineloop_critic::QualityEvaluator;

    fn feedback() -> FeedbackPayload {
        let evaluator = QualityEvaluator::default();
        let metrics = evaluator.evaluate(&RawSignals::default()).unwrap();
        evaluator.feedback(&metrics)
    }

    #[tokio::test]
    async fn test_replay_agent_plays_steps_in_order() {
        let agent = ReplayAgent::new(vec![
            ReplayStep::Refined {
                artifact: "v2".into(),
                cost: 0.5,
            },
            ReplayStep::Failed {
                reason: "rate limited".into(),
            },
        ]);
        let config = AgentConfig::default();
        let artifact = Artifact::new("v1");

        let first = agent.refine(&artifact, &feedback(), &config).await.unwrap();
        assert_eq!(first.artifact.content(), "v2");
        assert_eq!(first.cost, 0.5);

        let second = agent.refine(&artifact, &feedback(), &config).await;
        assert!(matches!(second, Err(AgentError::RefinementFailed(r)) if r == "rate limited"));

        let third = agent.refine(&artifact, &feedback(), &config).await;
        assert!(matches!(third, Err(AgentError::RefinementFailed(_))));

        assert_eq!(agent.feedback_seen().len(), 3);
        assert_eq!(agent.remaining(), 0);
    }

    #[tokio::test]
    async fn test_hang_step_never_completes() {
        let agent = ReplayAgent::new(vec![ReplayStep::Hang]);
        let config = AgentConfig::default();
        let artifact = Artifact::new("v1");
        let feedback = feedback();

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            agent.refine(&artifact, &feedback, &config),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_signal_source_unknown_artifact() {
        let source =
            ReplaySignalSource::new(HashMap::new()).with_signals("v1", RawSignals::default());
        let config = AgentConfig::default();

        assert!(source.collect(&Artifact::new("v1"), &config).await.is_ok());
        let err = source.collect(&Artifact::new("v9"), &config).await.unwrap_err();
        assert!(matches!(err, SignalError::UnknownArtifact(a) if a == "v9"));
    }

    #[test]
    fn test_script_parses_from_json() {
        let script = ReplayScript::from_json(
            r#"{
                "initial_artifact": "draft",
                "signals": {
                    "draft": {"tests": {"test_count": 2, "failed_test_count": 2, "coverage": 0.1}},
                    "final": {"tests": {"test_count": 2, "failed_test_count": 0, "coverage": 0.9}}
                },
                "steps": [
                    {"outcome": "refined", "artifact": "final", "cost": 0.3},
                    {"outcome": "failed", "reason": "boom"},
                    {"outcome": "hang"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(script.steps.len(), 3);

        let (artifact, agent, _source) = script.into_parts();
        assert_eq!(artifact.content(), "draft");
        assert_eq!(agent.remaining(), 3);
    }
}
