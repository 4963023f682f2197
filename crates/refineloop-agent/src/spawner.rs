use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::{AgentConfig, AgentError, ProcessOutput};

/// Utility for spawning collaborator processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process, feed it `stdin`, and capture its output.
    ///
    /// The child is killed if the returned future is dropped, so wrapping this
    /// call in a timeout does not leak processes.
    pub async fn spawn(
        binary: &Path,
        args: &[String],
        config: &AgentConfig,
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, AgentError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            args = ?args,
            working_dir = %config.working_dir.display(),
            stdin_bytes = stdin.len(),
            "Spawning collaborator process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let mut stdin_handle = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::ExecutionFailed("stdin not captured".into()))?;
        let stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::ExecutionFailed("stdout not captured".into()))?;
        let stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::ExecutionFailed("stderr not captured".into()))?;

        // Write stdin on its own task so a chatty child can't deadlock us
        let writer = tokio::spawn(async move {
            if let Err(e) = stdin_handle.write_all(&stdin).await {
                debug!(error = %e, "Child closed stdin early");
            }
            // Dropping the handle closes the pipe
        });

        let mut stdout_reader = BufReader::new(stdout_handle).lines();
        let mut stderr_reader = BufReader::new(stderr_handle).lines();

        let mut stdout = String::new();
        let mut stderr = String::new();
        // A closed stream resolves immediately on every poll; stop selecting it
        let mut stderr_done = false;

        // Read both streams concurrently
        loop {
            tokio::select! {
                biased;

                result = stdout_reader.next_line() => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stdout");
                            push_line(&mut stdout, &line);
                        }
                        Ok(None) => {
                            // stdout closed, drain stderr
                            while !stderr_done {
                                match stderr_reader.next_line().await {
                                    Ok(Some(line)) => {
                                        trace!(line = %line, "stderr");
                                        push_line(&mut stderr, &line);
                                    }
                                    _ => stderr_done = true,
                                }
                            }
                            break;
                        }
                        Err(e) => {
                            return Err(AgentError::ExecutionFailed(format!(
                                "Failed to read stdout: {}",
                                e
                            )));
                        }
                    }
                }
                result = stderr_reader.next_line(), if !stderr_done => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stderr");
                            push_line(&mut stderr, &line);
                        }
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            return Err(AgentError::ExecutionFailed(format!(
                                "Failed to read stderr: {}",
                                e
                            )));
                        }
                    }
                }
            }
        }

        let status = child.wait().await?;
        let _ = writer.await;
        let duration = start.elapsed();

        debug!(
            exit_code = status.code().unwrap_or(-1),
            duration_ms = duration.as_millis(),
            "Collaborator process completed"
        );

        Ok(ProcessOutput::new(
            stdout,
            stderr,
            status.code().unwrap_or(-1),
            duration,
        ))
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
