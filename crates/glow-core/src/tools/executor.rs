//! Tool executor and the context handed to each tool.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::error::{ToolError, ToolResult};
use crate::exec::{truncate_output, CommandRunner, CommandSpec, ExecutionResult, ProcessRunner};
use crate::tool_dispatch::{dispatch_tool, ToolInvocation};
use crate::watcher::{ChangeNotifier, FileChange};
use crate::ToolCall;

/// Limits applied to spawned commands and their output.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub command_timeout: Duration,
    pub max_output_chars: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(60),
            max_output_chars: 30_000,
        }
    }
}

impl From<&glow_config::AgentConfig> for ExecutorSettings {
    fn from(config: &glow_config::AgentConfig) -> Self {
        Self {
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            max_output_chars: config.max_output_chars,
        }
    }
}

/// Outcome of one tool call, keyed by the call's correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn ok(id: &str, result: String) -> Self {
        Self {
            id: id.to_string(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(id: &str, error: String) -> Self {
        Self {
            id: id.to_string(),
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// `{success, result|error}` as the text of a tool-result message.
    pub fn to_message_content(&self) -> String {
        let body = if self.success {
            serde_json::json!({ "success": true, "result": self.result })
        } else {
            serde_json::json!({ "success": false, "error": self.error })
        };
        body.to_string()
    }
}

/// Borrowed view of the executor's state, passed to each tool function.
pub struct ToolContext<'a> {
    pub context: &'a AgentContext,
    pub runner: &'a dyn CommandRunner,
    pub notifier: &'a ChangeNotifier,
    pub settings: &'a ExecutorSettings,
}

impl ToolContext<'_> {
    pub fn publish(&self, change: FileChange) {
        self.notifier.publish(change);
    }

    /// Spawn a command and fold a non-zero exit into `CommandFailed`.
    pub async fn run(&self, spec: CommandSpec) -> ToolResult<ExecutionResult> {
        let result = self.runner.run(&spec).await?;
        if result.success {
            Ok(result)
        } else {
            Err(ToolError::CommandFailed(truncate_output(
                &result.summary(),
                self.settings.max_output_chars,
            )))
        }
    }
}

/// Runs tool calls for one project.
pub struct ToolExecutor {
    context: AgentContext,
    runner: Arc<dyn CommandRunner>,
    notifier: ChangeNotifier,
    settings: ExecutorSettings,
}

impl ToolExecutor {
    pub fn new(context: AgentContext, notifier: ChangeNotifier) -> Self {
        Self {
            context,
            runner: Arc::new(ProcessRunner),
            notifier,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Execute one call. Never fails: errors become `success: false`.
    pub async fn execute(&self, call: &ToolCall) -> ToolCallResult {
        debug!(id = %call.id, tool = %call.tool, "executing tool call");

        let invocation = match ToolInvocation::from_call(call) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(id = %call.id, kind = e.kind(), "{}", e);
                return ToolCallResult::failed(&call.id, e.to_string());
            }
        };

        let ctx = ToolContext {
            context: &self.context,
            runner: self.runner.as_ref(),
            notifier: &self.notifier,
            settings: &self.settings,
        };

        match dispatch_tool(invocation, &ctx).await {
            Ok(output) => {
                info!(id = %call.id, tool = %call.tool, "tool succeeded");
                ToolCallResult::ok(&call.id, output)
            }
            Err(e) => {
                warn!(id = %call.id, tool = %call.tool, kind = e.kind(), "tool failed: {}", e);
                ToolCallResult::failed(&call.id, e.to_string())
            }
        }
    }
}
