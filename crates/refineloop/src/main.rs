mod config;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use refineloop_agent::{
    Artifact, CommandAgent, CommandSignalSource, RefinementAgent, ReplayScript, SignalSource,
};
use refineloop_core::{
    FeedbackOrchestrator, IterationCallback, IterationRecord, RunResult, RunStatus,
};
use refineloop_critic::{CheckKind, QualityEvaluator, RawSignals, RunBudget};
use refineloop_logging::{init_tracing, LogFormat, Logger, RunJournal};

use config::{BudgetOverrides, ProjectConfig};

#[derive(Parser, Debug)]
#[command(
    name = "refineloop",
    about = "Quality-gated feedback loop for iterative artifact refinement",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Working directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Diagnostic log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Also write diagnostics as JSON to <DIR>/refineloop.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refine an artifact with external agent and signal commands
    Run(RunArgs),
    /// Drive a scripted scenario through the loop
    Replay(ReplayArgs),
    /// Score a single signals file and show the decision
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// File holding the initial artifact
    #[arg(short, long)]
    artifact: PathBuf,

    /// Refinement agent program (overrides [agent] in refineloop.toml)
    #[arg(long)]
    agent_cmd: Option<String>,

    /// Argument passed to the agent program (repeatable)
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    agent_args: Vec<String>,

    /// Signal source program (overrides [signals] in refineloop.toml)
    #[arg(long)]
    signals_cmd: Option<String>,

    /// Argument passed to the signal program (repeatable)
    #[arg(long = "signals-arg", allow_hyphen_values = true)]
    signals_args: Vec<String>,

    #[command(flatten)]
    budget: BudgetArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Dry run: show what would happen without executing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Scenario JSON with initial_artifact, signals and steps
    #[arg(short, long)]
    scenario: PathBuf,

    #[command(flatten)]
    budget: BudgetArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Raw signals JSON file
    #[arg(short, long)]
    signals: PathBuf,

    /// Iteration the signals belong to
    #[arg(long, default_value_t = 1)]
    iteration: u32,

    /// Maximum iterations used for the cap rule
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,

    /// Output the evaluation as JSON
    #[arg(long)]
    json_output: bool,
}

#[derive(Args, Debug)]
struct BudgetArgs {
    /// Maximum iterations
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,

    /// Maximum cumulative refinement cost
    #[arg(long)]
    max_cost: Option<f64>,

    /// Maximum wall-clock time, e.g. "90s" or "15m"
    #[arg(long, value_parser = parse_duration)]
    max_duration: Option<Duration>,
}

impl From<&BudgetArgs> for BudgetOverrides {
    fn from(args: &BudgetArgs) -> Self {
        Self {
            max_iterations: args.max_iterations,
            max_cost: args.max_cost,
            max_duration: args.max_duration,
        }
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Record the run as JSONL under the data directory
    #[arg(long)]
    journal: bool,

    /// Record the run as JSONL at this path
    #[arg(long)]
    journal_path: Option<PathBuf>,

    /// Append run events as JSON lines to this file
    #[arg(long)]
    event_log: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_format: LogFormat = cli.log_format.into();
    let tracing_guard = init_tracing(&cli.log_level, log_format, cli.log_dir.as_deref());

    let config = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    let exit_code = match &cli.command {
        Command::Run(args) => run(args, &config, &working_dir, log_format).await?,
        Command::Replay(args) => replay(args, &config, &working_dir, log_format).await?,
        Command::Evaluate(args) => evaluate(args, &config)?,
    };

    // process::exit skips destructors; flush the file writer first
    drop(tracing_guard);
    std::process::exit(exit_code);
}

async fn run(
    args: &RunArgs,
    config: &ProjectConfig,
    working_dir: &Path,
    log_format: LogFormat,
) -> Result<i32> {
    let artifact_path = if args.artifact.is_absolute() {
        args.artifact.clone()
    } else {
        working_dir.join(&args.artifact)
    };
    let content = std::fs::read_to_string(&artifact_path)
        .with_context(|| format!("Failed to read artifact {}", artifact_path.display()))?;

    let budget = config.budget((&args.budget).into())?;
    let agent_cmd = config
        .agent_command(args.agent_cmd.as_deref(), &args.agent_args)
        .context("No agent command. Use --agent-cmd or set [agent] in refineloop.toml")?;
    let signals_cmd = config
        .signals_command(args.signals_cmd.as_deref(), &args.signals_args)
        .context("No signal command. Use --signals-cmd or set [signals] in refineloop.toml")?;

    if args.dry_run {
        println!("=== Dry Run ===");
        println!(
            "Artifact: {} ({} bytes)",
            artifact_path.display(),
            content.len()
        );
        println!("Working dir: {}", working_dir.display());
        println!("Agent: {} {}", agent_cmd.command, agent_cmd.args.join(" "));
        println!(
            "Signals: {} {}",
            signals_cmd.command,
            signals_cmd.args.join(" ")
        );
        println!("Max iterations: {}", budget.max_iterations());
        println!("Max cost: {}", budget.max_cost());
        println!(
            "Max duration: {}",
            humantime_serde::re::humantime::format_duration(budget.max_duration())
        );
        return Ok(0);
    }

    let agent = CommandAgent::new(agent_cmd.command, agent_cmd.args);
    let signal_source = CommandSignalSource::new(signals_cmd.command, signals_cmd.args);

    let result = drive(
        Artifact::new(content),
        budget,
        &agent,
        &signal_source,
        config,
        working_dir,
        &args.output,
        log_format,
    )
    .await?;
    Ok(result.exit_code())
}

async fn replay(
    args: &ReplayArgs,
    config: &ProjectConfig,
    working_dir: &Path,
    log_format: LogFormat,
) -> Result<i32> {
    let json = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("Failed to read scenario {}", args.scenario.display()))?;
    let script = ReplayScript::from_json(&json)
        .with_context(|| format!("Failed to parse scenario {}", args.scenario.display()))?;
    let (artifact, agent, signal_source) = script.into_parts();

    let budget = config.budget((&args.budget).into())?;
    let result = drive(
        artifact,
        budget,
        &agent,
        &signal_source,
        config,
        working_dir,
        &args.output,
        log_format,
    )
    .await?;
    Ok(result.exit_code())
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    artifact: Artifact,
    budget: RunBudget,
    agent: &dyn RefinementAgent,
    signal_source: &dyn SignalSource,
    config: &ProjectConfig,
    working_dir: &Path,
    output: &OutputArgs,
    log_format: LogFormat,
) -> Result<RunResult> {
    let logger = match &output.event_log {
        Some(path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?,
        None => Logger::new(log_format),
    };

    let journal = match (&output.journal_path, output.journal) {
        (Some(path), _) => Some(RunJournal::with_path(path.clone())),
        (None, true) => Some(RunJournal::new(artifact.content())),
        (None, false) => None,
    }
    .transpose()
    .context("Failed to create run journal")?
    .map(Arc::new);

    let evaluator =
        QualityEvaluator::new(config.weights()).context("Invalid [weights] in config")?;

    let mut orchestrator = FeedbackOrchestrator::new(
        artifact,
        budget,
        agent,
        signal_source,
        Arc::new(logger),
    )
    .with_evaluator(evaluator)
    .with_working_dir(working_dir.to_path_buf());

    if let Some(journal) = &journal {
        journal.write_start(
            agent.name(),
            signal_source.name(),
            working_dir,
            budget.max_iterations(),
            budget.max_cost(),
            budget.max_duration().as_secs_f64(),
        );
        let journal = journal.clone();
        let callback: IterationCallback =
            Arc::new(move |record: &IterationRecord| journal.write_iteration(record));
        orchestrator = orchestrator.with_iteration_callback(callback);
    }

    // Handle Ctrl+C gracefully
    let interrupt_handle = orchestrator.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current iteration...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let result = match orchestrator.run().await {
        Ok(result) => result,
        Err(e) => {
            if let (Some(journal), Some(partial)) = (&journal, e.partial()) {
                journal.write_end(&partial.summary());
                eprintln!("Journal: {}", journal.path().display());
            }
            return Err(e.into());
        }
    };

    if let Some(journal) = &journal {
        journal.write_end(&result.summary());
        eprintln!("Journal: {}", journal.path().display());
    }

    if output.json_output {
        let json = serde_json::to_string_pretty(&result)?;
        println!("{}", json);
    } else {
        print_outcome(&result);
    }

    Ok(result)
}

fn evaluate(args: &EvaluateArgs, config: &ProjectConfig) -> Result<i32> {
    let json = std::fs::read_to_string(&args.signals)
        .with_context(|| format!("Failed to read signals {}", args.signals.display()))?;
    let signals = RawSignals::from_json(&json)
        .with_context(|| format!("Failed to parse signals {}", args.signals.display()))?;

    let evaluator =
        QualityEvaluator::new(config.weights()).context("Invalid [weights] in config")?;
    let budget = config.budget(BudgetOverrides {
        max_iterations: args.max_iterations,
        ..Default::default()
    })?;

    let metrics = evaluator.evaluate(&signals)?;
    let decision = evaluator.decide(&metrics, args.iteration, &budget);
    let feedback = evaluator.feedback(&metrics);
    let halt_value = QualityEvaluator::halt_value(&metrics);
    let continue_value = QualityEvaluator::continue_value(&metrics);

    if args.json_output {
        let json = serde_json::json!({
            "metrics": metrics,
            "halt_value": halt_value,
            "continue_value": continue_value,
            "decision": decision,
            "feedback": feedback,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(0);
    }

    println!("Overall quality: {:.3}", metrics.overall_quality());
    for check in CheckKind::ALL {
        println!(
            "  {:<14} {:.3}  (weight {:.2})",
            check.to_string(),
            metrics.score(check),
            evaluator.weights().weight(check)
        );
    }
    println!(
        "Q(HALT) = {:.3}, Q(CONTINUE) = {:.3}",
        halt_value, continue_value
    );
    println!("Decision: {}", decision.short_description());
    if !feedback.is_clean() {
        println!();
        println!("{}", feedback.to_prompt());
    }
    Ok(0)
}

fn print_outcome(result: &RunResult) {
    let heading = if result.cancelled {
        "=== INTERRUPTED ===".yellow()
    } else if result.is_forced_halt() {
        "=== HALTED (iteration cap) ===".yellow()
    } else if result.status == RunStatus::HaltedSuccess {
        "=== HALTED ===".green()
    } else {
        format!("=== ABORTED ({}) ===", result.status).as_str().red()
    };

    eprintln!();
    eprintln!("{}", heading.bold());
    eprintln!("Iterations: {}", result.iterations);
    eprintln!("Final quality: {:.3}", result.final_quality);
    eprintln!("Total cost: {:.2}", result.total_cost);
    eprintln!("Duration: {:.1}s", result.total_duration_secs);
    if let Some(reason) = result.halt_reason {
        eprintln!("Halt reason: {}", reason);
    }
    if let Some(reason) = &result.abort_reason {
        eprintln!("Reason: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "refineloop",
            "run",
            "--artifact",
            "draft.md",
            "--agent-cmd",
            "refiner",
            "--agent-arg",
            "--fast",
            "-n",
            "4",
            "--max-duration",
            "90s",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.artifact, PathBuf::from("draft.md"));
        assert_eq!(args.agent_cmd.as_deref(), Some("refiner"));
        assert_eq!(args.agent_args, vec!["--fast".to_string()]);
        assert_eq!(args.budget.max_iterations, Some(4));
        assert_eq!(args.budget.max_duration, Some(Duration::from_secs(90)));
        assert!(args.signals_cmd.is_none());
    }

    #[test]
    fn test_cli_rejects_bad_duration() {
        let parsed = Cli::try_parse_from([
            "refineloop",
            "replay",
            "--scenario",
            "s.json",
            "--max-duration",
            "soon",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "refineloop",
            "evaluate",
            "--signals",
            "signals.json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormatChoice::Json));
        assert!(matches!(cli.command, Command::Evaluate(_)));
    }
}
