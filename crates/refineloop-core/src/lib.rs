mod context;
mod error;
pub mod guard;
mod loop_runner;
mod outcome;

pub use context::{IterationRecord, RunState};
pub use error::LoopError;
pub use guard::{GuardAbort, GuardThresholds, GuardTrip, GuardVerdict, LoopGuard};
pub use loop_runner::{FeedbackOrchestrator, IterationCallback};
pub use outcome::{RunResult, RunStatus, RunSummary};
