use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for the feedback loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted {
        agent: String,
        signal_source: String,
        artifact_len: usize,
        max_iterations: u32,
        max_cost: f64,
        max_duration_secs: f64,
    },
    IterationEvaluated {
        iteration: u32,
        overall_quality: f64,
        tests_passing: bool,
        cost: f64,
        total_cost: f64,
    },
    DecisionMade {
        iteration: u32,
        decision: String,
    },
    GuardTripped {
        iteration: u32,
        reason: String,
        detail: String,
    },
    RefinementStarted {
        iteration: u32,
        timeout_secs: f64,
    },
    RefinementCompleted {
        iteration: u32,
        cost: f64,
        duration_secs: f64,
        artifact_len: usize,
    },
    RefinementFailed {
        iteration: u32,
        error: String,
    },
    RunCancelled {
        iterations: u32,
    },
    RunFailed {
        iterations: u32,
        total_cost: f64,
        error: String,
    },
    RunFinished {
        status: String,
        iterations: u32,
        final_quality: f64,
        total_cost: f64,
        duration_secs: f64,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for refineloop events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    console: bool,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            console: true,
            file_writer: None,
        }
    }

    /// A logger that renders nothing; used by tests and embedders
    pub fn silent() -> Self {
        Self {
            format: LogFormat::Compact,
            console: false,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            console: true,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if !self.console {
            return;
        }

        let mut stderr = std::io::stderr();
        let rendered = match self.format {
            LogFormat::Json => serde_json::to_string(event).ok(),
            LogFormat::Pretty => Self::render_pretty(event),
            LogFormat::Compact => Self::render_compact(event),
        };
        if let Some(text) = rendered {
            let _ = writeln!(stderr, "{}", text);
        }
    }

    fn render_pretty(event: &LogEvent) -> Option<String> {
        let text = match event {
            LogEvent::RunStarted {
                agent,
                signal_source,
                artifact_len,
                max_iterations,
                max_cost,
                max_duration_secs,
            } => {
                let border = "─".repeat(69);
                format!(
                    "\n{}\n{}  {}\n{}  {} {}  {} {}\n\
                     {}  {} {} iterations, {:.2} cost, {:.0}s\n{}  {} {} bytes\n{}\n",
                    format!("╭{}╮", border).bright_blue(),
                    "│".bright_blue(),
                    "refineloop".bold().bright_white(),
                    "│".bright_blue(),
                    "Agent:".dimmed(),
                    agent,
                    "Signals:".dimmed(),
                    signal_source,
                    "│".bright_blue(),
                    "Budget:".dimmed(),
                    max_iterations,
                    max_cost,
                    max_duration_secs,
                    "│".bright_blue(),
                    "Artifact:".dimmed(),
                    artifact_len,
                    format!("╰{}╯", border).bright_blue(),
                )
            }
            LogEvent::IterationEvaluated {
                iteration,
                overall_quality,
                tests_passing,
                total_cost,
                ..
            } => {
                let header = format!("─ Iteration {} ", iteration);
                let padding = "─".repeat(67usize.saturating_sub(header.chars().count()));
                let tests = if *tests_passing {
                    "tests passing".bright_green()
                } else {
                    "tests failing".bright_red()
                };
                format!(
                    "{}{}{}\n  {} quality {:.3}, {}, spent {:.2}",
                    "┌".bright_blue(),
                    header.bright_blue().bold(),
                    padding.bright_blue(),
                    "▶".bright_cyan(),
                    overall_quality,
                    tests,
                    total_cost
                )
            }
            LogEvent::DecisionMade { decision, .. } => {
                if decision.starts_with("HALT") {
                    format!("    {}", format!("✓ Decision: {}", decision).bright_green())
                } else {
                    format!("    {}", format!("→ Decision: {}", decision).bright_yellow())
                }
            }
            LogEvent::GuardTripped { reason, detail, .. } => format!(
                "    {} Guard: {} ({})",
                "⚠".bright_yellow(),
                reason.bright_yellow(),
                detail
            ),
            LogEvent::RefinementStarted { .. } => format!(
                "  {} {}",
                "▶".bright_magenta(),
                "REFINE".bright_magenta().bold()
            ),
            LogEvent::RefinementCompleted {
                cost,
                duration_secs,
                ..
            } => format!(
                "    {} Done ({:.1}s, cost {:.2})\n{}",
                "✓".bright_green(),
                duration_secs,
                cost,
                format!("└{}┘", "─".repeat(69)).bright_blue()
            ),
            LogEvent::RefinementFailed { error, .. } => format!(
                "    {} {}\n{}",
                "✗".bright_red(),
                error.bright_red(),
                format!("└{}┘", "─".repeat(69)).bright_blue()
            ),
            LogEvent::RunCancelled { iterations } => format!(
                "\n{} Cancelled after {} iteration(s)",
                "⚠".bright_yellow(),
                iterations
            ),
            LogEvent::RunFailed {
                iterations, error, ..
            } => format!(
                "\n{} Failed after {} iteration(s): {}",
                "✗".bright_red(),
                iterations,
                error.bright_red()
            ),
            // Final outcome is printed by the caller
            LogEvent::RunFinished { .. } => return None,
        };
        Some(text)
    }

    fn render_compact(event: &LogEvent) -> Option<String> {
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::RunStarted { max_iterations, .. } => {
                format!("[{}] run:start max={}", timestamp, max_iterations)
            }
            LogEvent::IterationEvaluated {
                iteration,
                overall_quality,
                total_cost,
                ..
            } => format!(
                "[{}] eval:{} q={:.3} spent={:.2}",
                timestamp, iteration, overall_quality, total_cost
            ),
            LogEvent::DecisionMade {
                iteration,
                decision,
            } => format!("[{}] decide:{} {}", timestamp, iteration, decision),
            LogEvent::GuardTripped {
                iteration, reason, ..
            } => format!("[{}] guard:{} {}", timestamp, iteration, reason),
            LogEvent::RefinementStarted {
                iteration,
                timeout_secs,
            } => format!(
                "[{}] refine:start:{} timeout={:.1}s",
                timestamp, iteration, timeout_secs
            ),
            LogEvent::RefinementCompleted {
                iteration,
                cost,
                duration_secs,
                ..
            } => format!(
                "[{}] refine:done:{} cost={:.2} {:.1}s",
                timestamp, iteration, cost, duration_secs
            ),
            LogEvent::RefinementFailed { iteration, error } => {
                format!("[{}] refine:fail:{} {}", timestamp, iteration, error)
            }
            LogEvent::RunCancelled { iterations } => {
                format!("[{}] run:cancel:{}", timestamp, iterations)
            }
            LogEvent::RunFailed {
                iterations, error, ..
            } => format!("[{}] run:fail:{} {}", timestamp, iterations, error),
            LogEvent::RunFinished {
                status,
                iterations,
                duration_secs,
                ..
            } => format!(
                "[{}] run:done:{} {} {:.1}s",
                timestamp, iterations, status, duration_secs
            ),
        };
        Some(msg)
    }
}
