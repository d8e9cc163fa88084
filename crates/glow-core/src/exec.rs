//! Process spawning behind a trait, so the safety gates can be tested without
//! ever starting a real process.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ToolError, ToolResult};

/// One process invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str], cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.into(),
            timeout,
        }
    }

    /// Run a command line through the platform shell.
    pub fn shell(command: &str, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        if cfg!(windows) {
            Self::new("cmd", &["/C", command], cwd, timeout)
        } else {
            Self::new("sh", &["-c", command], cwd, timeout)
        }
    }

    pub fn display(&self) -> String {
        if self.program == "sh" || self.program == "cmd" {
            self.args.last().cloned().unwrap_or_default()
        } else {
            std::iter::once(self.program.as_str())
                .chain(self.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl ExecutionResult {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    pub fn failed(exit_code: i32, stderr: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
            success: false,
        }
    }

    /// Human-readable summary for a tool result.
    pub fn summary(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) if self.success => "Command executed successfully".to_string(),
            (true, true) => format!("Command failed with exit code {}", self.exit_code),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Spawn the command and wait for it. A non-zero exit is an `Ok` result
    /// with `success == false`; only spawn failures and timeouts are errors.
    async fn run(&self, spec: &CommandSpec) -> ToolResult<ExecutionResult>;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> ToolResult<ExecutionResult> {
        debug!(program = %spec.program, cwd = %spec.cwd.display(), "spawning: {}", spec.display());

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::CommandFailed(format!("{}: {}", spec.display(), e)))?;

        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                success: output.status.success(),
            }),
            Ok(Err(e)) => Err(ToolError::CommandFailed(format!("{}: {}", spec.display(), e))),
            Err(_) => {
                warn!("command timed out after {:?}: {}", spec.timeout, spec.display());
                Err(ToolError::CommandTimedOut {
                    command: spec.display(),
                    secs: spec.timeout.as_secs(),
                })
            }
        }
    }
}

/// Records every spec it is asked to run and answers from a script.
/// Used by tests to prove that a gate refused a call before anything spawned.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<CommandSpec>>>,
    results: Arc<Mutex<Vec<ExecutionResult>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue results; once the queue is empty every call succeeds with no output.
    pub fn with_results(self, results: Vec<ExecutionResult>) -> Self {
        self.results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(results);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> ToolResult<ExecutionResult> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(spec.clone());
        let mut results = self.results.lock().unwrap_or_else(|p| p.into_inner());
        Ok(if results.is_empty() {
            ExecutionResult::ok("")
        } else {
            results.remove(0)
        })
    }
}

/// Keep the head of very long output.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}\n... [output truncated at {} characters]", head, max_chars)
}
