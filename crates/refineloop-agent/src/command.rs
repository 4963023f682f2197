use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use refineloop_critic::{FeedbackPayload, RawSignals};

use crate::{
    AgentConfig, AgentError, Artifact, ProcessSpawner, Refinement, RefinementAgent, SignalError,
    SignalSource,
};

/// JSON written to a refinement command's stdin
#[derive(Debug, Serialize)]
struct RefineRequest<'a> {
    artifact: &'a str,
    feedback: &'a FeedbackPayload,
    /// Plain-text rendering of `feedback` for prompt-driven tools
    prompt: String,
}

/// JSON expected on a refinement command's stdout
#[derive(Debug, Deserialize)]
struct RefineResponse {
    artifact: String,
    #[serde(default)]
    cost: f64,
}

/// Refinement agent backed by an external command.
///
/// The command receives `{"artifact", "feedback", "prompt"}` on stdin and must
/// print `{"artifact": "...", "cost": 0.12}` on stdout.
pub struct CommandAgent {
    program: PathBuf,
    args: Vec<String>,
    name: String,
}

impl CommandAgent {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = program.display().to_string();
        Self {
            program,
            args,
            name,
        }
    }
}

#[async_trait]
impl RefinementAgent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refine(
        &self,
        artifact: &Artifact,
        feedback: &FeedbackPayload,
        config: &AgentConfig,
    ) -> Result<Refinement, AgentError> {
        let request = RefineRequest {
            artifact: artifact.content(),
            feedback,
            prompt: feedback.to_prompt(),
        };
        let stdin = serde_json::to_vec(&request)
            .map_err(|e| AgentError::ExecutionFailed(format!("Failed to encode request: {}", e)))?;

        debug!(agent = %self.name, artifact_len = artifact.len(), "Requesting refinement");
        let output = ProcessSpawner::spawn(&self.program, &self.args, config, stdin).await?;

        if !output.success() {
            return Err(AgentError::RefinementFailed(format!(
                "{} exited with code {}: {}",
                self.name,
                output.exit_code,
                output.stderr_tail(5)
            )));
        }

        let response: RefineResponse = serde_json::from_str(output.stdout.trim())
            .map_err(|e| AgentError::InvalidOutput(e.to_string()))?;

        Refinement::new(Artifact::new(response.artifact), response.cost, output.duration)
    }
}

/// Signal source backed by an external command.
///
/// The artifact is written to stdin; the command must print [`RawSignals`] JSON.
pub struct CommandSignalSource {
    program: PathBuf,
    args: Vec<String>,
    name: String,
}

impl CommandSignalSource {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = program.display().to_string();
        Self {
            program,
            args,
            name,
        }
    }
}

#[async_trait]
impl SignalSource for CommandSignalSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(
        &self,
        artifact: &Artifact,
        config: &AgentConfig,
    ) -> Result<RawSignals, SignalError> {
        let stdin = artifact.content().as_bytes().to_vec();
        let output = ProcessSpawner::spawn(&self.program, &self.args, config, stdin).await?;

        if !output.success() {
            return Err(SignalError::CommandFailed {
                exit_code: output.exit_code,
                stderr: output.stderr_tail(5),
            });
        }

        Ok(RawSignals::from_json(output.stdout.trim())?)
    }
}
