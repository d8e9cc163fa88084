pub mod agent_loop;
pub mod context;
pub mod error;
pub mod exec;
pub mod prompts;
pub mod provider_registration;
pub mod safety;
pub mod tool_definitions;
pub mod tool_dispatch;
pub mod tools;
pub mod watcher;

pub use agent_loop::{
    AgentLoop, AgentLoopConfig, AgentLoopOutcome, AgentRuntime, StopReason, ToolCallRecord,
};
pub use context::{AgentContext, KnownFile};
pub use error::{ToolError, ToolResult};
pub use exec::{CommandRunner, CommandSpec, ExecutionResult, ProcessRunner, RecordingRunner};
pub use provider_registration::register_providers;
pub use tool_definitions::ToolName;
pub use tool_dispatch::ToolInvocation;
pub use tools::{ExecutorSettings, ToolCallResult, ToolExecutor};
pub use watcher::{ChangeKind, ChangeNotifier, ChangeWatcher, Debouncer, FileChange};

pub use glow_providers::{Message, MessageRole, ToolCall};
