//! Mock collaborators for testing and development.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::exec::{CommandExecutor, ProcessExecutionError, ProcessOutput};
use crate::traits::GuestInventory;

#[derive(Clone)]
struct ScriptedResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Scripted command executor.
///
/// Results are keyed by the space-joined argv. Unscripted commands succeed
/// with empty output, so tests only script the calls they care about. Every
/// invocation is recorded for assertions.
pub struct MockExecutor {
    scripts: Mutex<HashMap<String, Vec<ScriptedResult>>>,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the result for `command` (space-joined argv).
    ///
    /// Repeated calls for the same command queue up in order; the last
    /// result repeats once the queue is drained.
    pub fn script(&self, command: &str, exit_code: i32, stdout: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push(ScriptedResult {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            });
    }

    /// All commands executed so far, space-joined, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of executed commands containing `needle`.
    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(
        &self,
        argv: &[&str],
        _run_as_root: bool,
        accept: &[i32],
    ) -> Result<ProcessOutput, ProcessExecutionError> {
        let command = argv.join(" ");
        self.calls.lock().unwrap().push(command.clone());

        let result = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&command) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) => queue[0].clone(),
                None => ScriptedResult {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                },
            }
        };

        if accept.contains(&result.exit_code) {
            Ok(ProcessOutput {
                stdout: result.stdout,
                stderr: result.stderr,
            })
        } else {
            Err(ProcessExecutionError {
                command,
                exit_code: Some(result.exit_code),
                stdout: result.stdout,
                stderr: result.stderr,
            })
        }
    }
}

/// Fixed guest block device inventory.
pub struct MockInventory {
    devices: Mutex<Vec<String>>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }

    pub fn with_devices(devices: Vec<String>) -> Self {
        Self {
            devices: Mutex::new(devices),
        }
    }

    pub fn set_devices(&self, devices: Vec<String>) {
        *self.devices.lock().unwrap() = devices;
    }
}

impl Default for MockInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestInventory for MockInventory {
    fn all_block_devices(&self) -> Vec<String> {
        self.devices.lock().unwrap().clone()
    }
}
