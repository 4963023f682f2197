use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use refineloop_critic::{FeedbackPayload, RawSignals};

use crate::{Artifact, Refinement};

/// Errors that can occur during a refinement call
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Agent execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Refinement failed: {0}")]
    RefinementFailed(String),

    #[error("Agent returned invalid output: {0}")]
    InvalidOutput(String),
}

/// Errors raised while collecting signals for an artifact
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Signal source process error: {0}")]
    Process(#[from] AgentError),

    #[error("Signal source exited with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("Failed to parse signals: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("No signals recorded for artifact: {0}")]
    UnknownArtifact(String),
}

/// Configuration for a single refinement call
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Working directory for process-backed collaborators
    pub working_dir: PathBuf,
    /// Time left in the run budget (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            env_vars: HashMap::new(),
        }
    }
}

impl AgentConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Produces an improved candidate from the current artifact and its diagnosis
#[async_trait]
pub trait RefinementAgent: Send + Sync {
    /// Human-readable name of the agent
    fn name(&self) -> &str;

    /// Produce a new candidate artifact and report what it cost
    async fn refine(
        &self,
        artifact: &Artifact,
        feedback: &FeedbackPayload,
        config: &AgentConfig,
    ) -> Result<Refinement, AgentError>;
}

/// Turns an artifact into raw quality signals (tests, scans, checkers)
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self, artifact: &Artifact, config: &AgentConfig)
        -> Result<RawSignals, SignalError>;
}
