//! Shell command execution for workflow steps.
//!
//! Commands run through `sh -c` inside the workflow's working directory.
//! A non-zero exit is a normal result; only spawning failures and the
//! timeout are errors.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Fixed limit for shell and build-tool steps
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(600);

/// Invocation prefixed onto build-tool steps
const BUILD_TOOL: &str = "mvn";

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Failed to start command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub command: String,

    /// -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined record of command, exit code, stdout and stderr
    pub fn transcript(&self) -> String {
        format!(
            "Command: {}\nReturn code: {}\n\n=== STDOUT ===\n{}\n\n=== STDERR ===\n{}\n",
            self.command, self.exit_code, self.stdout, self.stderr
        )
    }
}

#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            timeout: SHELL_TIMEOUT,
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with a non-standard limit (tests)
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` in `cwd`, capturing its output
    pub async fn run(&self, command: &str, cwd: &Path) -> Result<ShellOutput, ShellError> {
        debug!(command = %command, cwd = %cwd.display(), "Running shell command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|source| ShellError::Spawn {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "Shell command timed out");
                return Err(ShellError::Timeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        Ok(ShellOutput {
            command: command.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Prefix the build tool onto `command` unless it is already there
pub fn build_tool_command(command: &str) -> String {
    let trimmed = command.trim();
    if trimmed == BUILD_TOOL || trimmed.starts_with(&format!("{BUILD_TOOL} ")) {
        trimmed.to_string()
    } else {
        format!("{BUILD_TOOL} {trimmed}")
    }
}
