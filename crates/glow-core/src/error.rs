//! Errors produced while executing a tool call.
//!
//! None of these escape the executor: each one is folded into a failed
//! `ToolCallResult` so the loop always has a tool-result message to append.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Refusing to run git in '{}': this is a protected location (home, desktop, documents or filesystem root)", .path.display())]
    PathSafetyViolation { path: PathBuf },

    #[error("Refusing to run git in '{}': it is not a repository root; the enclosing repository is '{}'", .requested.display(), .discovered.display())]
    GitRootMismatch {
        requested: PathBuf,
        discovered: PathBuf,
    },

    #[error("'{}' is not inside a git repository", .0.display())]
    NotARepository(PathBuf),

    #[error("Command blocked ({rule}): {command}")]
    CommandDenied { command: String, rule: &'static str },

    #[error("Command timed out after {secs}s: {command}")]
    CommandTimedOut { command: String, secs: u64 },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Unknown project template '{name}'. Available: {available}")]
    UnknownTemplate { name: String, available: String },

    #[error("{action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::PathSafetyViolation { .. } => "path_safety_violation",
            Self::GitRootMismatch { .. } => "git_root_mismatch",
            Self::NotARepository(_) => "not_a_repository",
            Self::CommandDenied { .. } => "command_denied",
            Self::CommandTimedOut { .. } => "command_timed_out",
            Self::CommandFailed(_) => "command_failed",
            Self::UnknownTemplate { .. } => "unknown_template",
            Self::Io { .. } => "io",
        }
    }
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;
