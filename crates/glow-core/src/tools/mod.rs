//! Tool implementations, grouped by category:
//! - `file_ops` - reading, writing, creating, deleting and listing files
//! - `shell` - gated shell command execution
//! - `git` - version control behind the directory double gate
//! - `scaffold` - project templates

pub mod executor;
pub mod file_ops;
pub mod git;
pub mod scaffold;
pub mod shell;

pub use executor::{ExecutorSettings, ToolCallResult, ToolContext, ToolExecutor};
