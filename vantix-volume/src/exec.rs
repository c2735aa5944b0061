//! External command execution.
//!
//! Every host side effect in this crate goes through the [`CommandExecutor`]
//! trait. The drivers only decide ordering, retry and accept-sets; the
//! executor owns privilege escalation and process plumbing, and tests swap
//! in a scripted implementation.

use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// An external tool exited outside the accepted set of exit codes.
///
/// `exit_code` is `None` when the process could not be spawned or was killed
/// by a signal.
#[derive(Error, Debug, Clone)]
#[error("Command `{command}` failed with exit code {exit_code:?}: {stderr}")]
pub struct ProcessExecutionError {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Executes external commands on behalf of the volume drivers.
pub trait CommandExecutor: Send + Sync {
    /// Run `argv`, escalating privileges when `run_as_root` is set.
    ///
    /// Exit codes outside `accept` are an error; callers normally pass
    /// `&[0]` and widen the set only for the documented
    /// "already-in-this-state" codes.
    fn execute(
        &self,
        argv: &[&str],
        run_as_root: bool,
        accept: &[i32],
    ) -> Result<ProcessOutput, ProcessExecutionError>;
}

/// Executor backed by `std::process::Command`.
pub struct SystemExecutor {
    root_helper: Option<String>,
}

impl SystemExecutor {
    /// Executor for a process that already runs with enough privilege.
    pub fn new() -> Self {
        Self { root_helper: None }
    }

    /// Prefix privileged commands with a helper such as `sudo`.
    pub fn with_root_helper(helper: impl Into<String>) -> Self {
        Self {
            root_helper: Some(helper.into()),
        }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(
        &self,
        argv: &[&str],
        run_as_root: bool,
        accept: &[i32],
    ) -> Result<ProcessOutput, ProcessExecutionError> {
        let mut full: Vec<&str> = Vec::with_capacity(argv.len() + 1);
        if run_as_root {
            if let Some(helper) = &self.root_helper {
                full.push(helper);
            }
        }
        full.extend_from_slice(argv);

        let command = full.join(" ");
        debug!(command = %command, "Executing command");

        let output = Command::new(full[0])
            .args(&full[1..])
            .output()
            .map_err(|e| ProcessExecutionError {
                command: command.clone(),
                exit_code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        match exit_code {
            Some(code) if accept.contains(&code) => Ok(ProcessOutput { stdout, stderr }),
            _ => Err(ProcessExecutionError {
                command,
                exit_code,
                stdout,
                stderr,
            }),
        }
    }
}
