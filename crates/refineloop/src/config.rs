//! Project configuration file support for refineloop.
//!
//! Loads configuration from `refineloop.toml` in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use refineloop_critic::{QualityWeights, RunBudget};

/// Budget used when neither the CLI nor the config file sets a value
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_MAX_COST: f64 = 10.0;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30 * 60);

/// The config file name
pub const CONFIG_FILE_NAME: &str = "refineloop.toml";

/// Project-level configuration loaded from `refineloop.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Replaces the default quality weights when present
    pub weights: Option<QualityWeights>,
    /// Refinement agent command
    pub agent: Option<CommandConfig>,
    /// Signal source command
    pub signals: Option<CommandConfig>,
}

/// Partial budget; unset fields fall back to CLI flags or defaults
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    pub max_iterations: Option<u32>,
    pub max_cost: Option<f64>,
    #[serde(default, with = "humantime_serde")]
    pub max_duration: Option<Duration>,
}

/// An external program and its arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Budget values given on the command line
#[derive(Debug, Default, Clone, Copy)]
pub struct BudgetOverrides {
    pub max_iterations: Option<u32>,
    pub max_cost: Option<f64>,
    pub max_duration: Option<Duration>,
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }

    /// Resolve the run budget.
    /// Priority: CLI flag > [budget] table > default
    pub fn budget(&self, overrides: BudgetOverrides) -> Result<RunBudget> {
        let budget = RunBudget::new(
            overrides
                .max_iterations
                .or(self.budget.max_iterations)
                .unwrap_or(DEFAULT_MAX_ITERATIONS),
            overrides
                .max_cost
                .or(self.budget.max_cost)
                .unwrap_or(DEFAULT_MAX_COST),
            overrides
                .max_duration
                .or(self.budget.max_duration)
                .unwrap_or(DEFAULT_MAX_DURATION),
        )
        .context("Invalid run budget")?;
        Ok(budget)
    }

    /// Get the effective quality weights
    pub fn weights(&self) -> QualityWeights {
        self.weights.unwrap_or_default()
    }

    /// Get the effective agent command.
    /// Priority: CLI program (with CLI args) > [agent] table > None
    pub fn agent_command(&self, program: Option<&str>, args: &[String]) -> Option<CommandConfig> {
        resolve_command(program, args, self.agent.as_ref())
    }

    /// Get the effective signal source command.
    /// Priority: CLI program (with CLI args) > [signals] table > None
    pub fn signals_command(&self, program: Option<&str>, args: &[String]) -> Option<CommandConfig> {
        resolve_command(program, args, self.signals.as_ref())
    }
}

fn resolve_command(
    program: Option<&str>,
    args: &[String],
    configured: Option<&CommandConfig>,
) -> Option<CommandConfig> {
    match program {
        Some(command) => Some(CommandConfig {
            command: command.to_string(),
            args: args.to_vec(),
        }),
        None => configured.cloned(),
    }
}
