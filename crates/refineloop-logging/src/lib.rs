//! # refineloop-logging
//!
//! Logging for the refineloop feedback loop.
//!
//! This crate provides structured logging for run events and a per-run journal.
//!
//! ## Key Types
//!
//! - [`Logger`] - Structured event logging
//! - [`LogEvent`] - Log event types
//! - [`LogFormat`] - Output formats (Pretty, JSON, Compact)
//! - [`RunJournal`] - JSONL record of a single run
//!
//! ## Log Formats
//!
//! - `Pretty` - Human-readable colored output
//! - `JSON` - Structured JSON lines
//! - `Compact` - Minimal text output

mod events;
mod journal;

pub use events::{LogEvent, LogFormat, Logger};
pub use journal::{JournalLine, RunJournal};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application.
///
/// When `log_dir` is set, diagnostics are also written as JSON to
/// `<log_dir>/refineloop.log`; keep the returned guard alive until exit so the
/// background writer flushes.
pub fn init_tracing(level: &str, format: LogFormat, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "refineloop.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(false))
                .init();
        }
        LogFormat::Pretty | LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .init();
        }
    }

    guard
}
