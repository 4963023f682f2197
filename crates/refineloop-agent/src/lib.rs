mod command;
mod output;
mod replay;
mod spawner;
mod traits;

pub use command::{CommandAgent, CommandSignalSource};
pub use output::{Artifact, ProcessOutput, Refinement};
pub use replay::{ReplayAgent, ReplayScript, ReplaySignalSource, ReplayStep};
pub use spawner::ProcessSpawner;
pub use traits::{AgentConfig, AgentError, RefinementAgent, SignalError, SignalSource};
