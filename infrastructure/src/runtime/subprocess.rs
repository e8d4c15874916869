//! Local-process runtime
//!
//! One fresh worker per invocation, torn down afterwards — workers are never
//! reused, because a reused worker would leak the previous call's credential
//! environment. The worker sees exactly the merged env (plus an inherited
//! `PATH` so executables resolve), receives the JSON body on stdin, and has
//! its stdout/stderr captured.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use toolgate_application::{PreparedInvocation, RuntimeError, ToolRuntime};
use toolgate_domain::{Isolation, RuntimeOutput, ToolSource};
use tracing::{debug, warn};

/// Runtime that executes program tools in isolated worker processes.
#[derive(Debug, Clone, Default)]
pub struct SubprocessRuntime;

impl SubprocessRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRuntime for SubprocessRuntime {
    fn isolation(&self) -> Isolation {
        Isolation::Process
    }

    async fn run(&self, prepared: &PreparedInvocation) -> Result<RuntimeOutput, RuntimeError> {
        let (program, args) = match &prepared.source {
            ToolSource::Program { program, args } => (program, args),
            ToolSource::Script { .. } => {
                return Err(RuntimeError::UnsupportedSource(format!(
                    "tool '{}' has a script source; route it to the browser runtime",
                    prepared.tool_name
                )));
            }
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(&prepared.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // If the timeout races drop the wait future, the worker dies with it
            .kill_on_drop(true);
        // Workers resolve their own executables; everything else is the
        // merged env only.
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }

        // Linux: request kernel to send SIGTERM to the worker when the host
        // dies. Catches cases where Drop doesn't run (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        debug!("Subprocess: spawning worker for '{}'", prepared.tool_name);
        let mut child = cmd.spawn()?;

        let body = if prepared.body.is_null() {
            String::new()
        } else {
            serde_json::to_string(&prepared.body)
                .map_err(|e| RuntimeError::Encoding(e.to_string()))?
        };
        if let Some(mut stdin) = child.stdin.take() {
            // A worker that never reads stdin closes the pipe early; that is
            // its business, not a host failure.
            if let Err(e) = stdin.write_all(body.as_bytes()).await {
                debug!("Subprocess: worker closed stdin early: {}", e);
            }
        }

        let output = match prepared.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, child.wait_with_output()).await {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!(
                            "Subprocess: '{}' timed out after {:?}, worker killed",
                            prepared.tool_name, timeout
                        );
                        return Err(RuntimeError::Timeout(timeout));
                    }
                }
            }
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let error = if output.status.success() {
            None
        } else {
            Some(format!(
                "worker exited with code {}",
                output.status.code().unwrap_or(-1)
            ))
        };

        debug!(
            "Subprocess: '{}' finished ({} stdout bytes, error: {})",
            prepared.tool_name,
            stdout.len(),
            error.is_some()
        );
        Ok(RuntimeOutput {
            stdout,
            stderr,
            error,
        })
    }
}
