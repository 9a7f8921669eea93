//! Process execution
//!
//! Two entry points: the fixed process-tree helper and arbitrary shell
//! commands. `execute_command` is a deliberate raw-shell capability: the
//! caller is trusted and the command string reaches `sh -c` untouched, so
//! pipes, `;`, `$(...)` and redirects all behave as they would in a terminal.
//! There is no allowlist and no sanitization here.
//!
//! Exit status is the failure signal. Output on stderr alone does not make a
//! command fail.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::response::ToolCallResponse;

/// File name of the bundled process-tree helper.
pub const HELPER_NAME: &str = "ps_tree.sh";

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Shell binary used for both commands and the helper
    pub shell: String,
    /// Explicit helper location; when `None` it is looked up next to the executable
    pub helper: Option<PathBuf>,
    /// Optional deadline per child process. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            helper: None,
            timeout: None,
        }
    }
}

/// Captured outcome of one child process.
#[derive(Debug)]
pub struct ProcessResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_error: Option<ProcessError>,
}

/// Reasons a child process counts as failed
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("{}", describe_exit(.code, .stderr))]
    Exit { code: Option<i32>, stderr: String },
    #[error("process timed out after {0:?}")]
    TimedOut(Duration),
    #[error("helper script ps_tree.sh not found next to the executable")]
    HelperNotFound,
}

fn describe_exit(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("command exited with status {}", code),
        None => "command terminated by signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        status
    } else {
        format!("{}: {}", status, stderr)
    }
}

/// Runs child processes and shapes their outcome into tool responses.
#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
    helper: Option<PathBuf>,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        let helper = config.helper.clone().or_else(|| {
            let exe = std::env::current_exe().ok()?;
            locate_helper(&exe)
        });
        match &helper {
            Some(path) => debug!("Process tree helper at {}", path.display()),
            None => warn!("Process tree helper {} not found; list_processes will fail", HELPER_NAME),
        }
        Self { config, helper }
    }

    /// Resolved helper location, if any.
    pub fn helper_path(&self) -> Option<&Path> {
        self.helper.as_deref()
    }

    /// Run the bundled process-tree helper.
    pub async fn run_diagnostic(&self) -> ToolCallResponse {
        let result = match &self.helper {
            Some(path) => {
                let mut cmd = tokio::process::Command::new(&self.config.shell);
                cmd.arg(path);
                self.run(cmd).await
            }
            None => ProcessResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_error: Some(ProcessError::HelperNotFound),
            },
        };
        completion_response("process tree", result)
    }

    /// Run `command` through the shell, verbatim.
    pub async fn run_shell(&self, command: &str) -> ToolCallResponse {
        let mut cmd = tokio::process::Command::new(&self.config.shell);
        cmd.arg("-c").arg(command);
        let result = self.run(cmd).await;
        completion_response("shell", result)
    }

    async fn run(&self, mut cmd: tokio::process::Command) -> ProcessResult {
        // Dropping the output future on timeout must take the child with it.
        cmd.kill_on_drop(true);

        let output = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(output) => output,
                Err(_) => {
                    return ProcessResult {
                        stdout: String::new(),
                        stderr: String::new(),
                        exit_error: Some(ProcessError::TimedOut(limit)),
                    }
                }
            },
            None => cmd.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return ProcessResult {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_error: Some(ProcessError::Spawn(e)),
                }
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_error = if output.status.success() {
            None
        } else {
            Some(ProcessError::Exit {
                code: output.status.code(),
                stderr: stderr.clone(),
            })
        };

        ProcessResult {
            stdout,
            stderr,
            exit_error,
        }
    }
}

/// Look for the helper relative to the executable's own directory.
///
/// The current working directory is never consulted.
pub fn locate_helper(exe: &Path) -> Option<PathBuf> {
    let dir = exe.parent()?;
    [
        dir.join(HELPER_NAME),
        dir.join("scripts").join(HELPER_NAME),
        dir.join("..").join("share").join("shellmem").join(HELPER_NAME),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

/// Map a finished process onto the response envelope.
pub fn completion_response(which: &str, result: ProcessResult) -> ToolCallResponse {
    if let Some(err) = result.exit_error {
        warn!("{} command failed: {}", which, err);
        return ToolCallResponse::error(format!("Error executing {} command: {}", which, err));
    }
    if result.stderr.is_empty() {
        ToolCallResponse::text(result.stdout)
    } else {
        ToolCallResponse::text(format!(
            "Output:\n{}\nStderr:\n{}",
            result.stdout, result.stderr
        ))
    }
}
