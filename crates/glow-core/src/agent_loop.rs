//! The bounded request/execute/append loop.
//!
//! Each iteration sends the full history plus the tool catalog to one
//! provider. Tool calls from a single response run as one concurrent batch;
//! their results are appended in the order the provider emitted them. Until
//! the first tool has run, every request forces a tool call.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use glow_providers::{
    CompletionRequest, LLMProvider, Message, MessageRole, ProviderRegistry, ToolCall, ToolChoice,
};

use crate::context::AgentContext;
use crate::exec::{CommandRunner, ProcessRunner};
use crate::prompts::{agent_system_prompt, TOOL_REQUIRED_REMINDER};
use crate::tool_definitions;
use crate::tools::{ExecutorSettings, ToolCallResult, ToolExecutor};
use crate::watcher::ChangeNotifier;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct AgentLoopConfig {
    pub max_iterations: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl From<&glow_config::AgentConfig> for AgentLoopConfig {
    fn from(config: &glow_config::AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    MaxIterations,
}

/// One executed tool call, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool: String,
    pub args: serde_json::Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallRecord {
    fn new(call: &ToolCall, result: &ToolCallResult) -> Self {
        Self {
            id: call.id.clone(),
            tool: call.tool.clone(),
            args: call.args.clone(),
            success: result.success,
            result: result.result.clone(),
            error: result.error.clone(),
        }
    }
}

/// Result of one run: `{success, content, toolCalls, ...}` or
/// `{success: false, error}`.
///
/// Hitting the iteration cap is not an error; `stop_reason` tells the caller
/// whether a final answer was actually produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLoopOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentLoopOutcome {
    fn finished(
        content: String,
        tool_calls: Vec<ToolCallRecord>,
        iterations: usize,
        stop_reason: StopReason,
    ) -> Self {
        Self {
            success: true,
            content: Some(content),
            tool_calls,
            iterations,
            stop_reason: Some(stop_reason),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            content: None,
            tool_calls: Vec::new(),
            iterations: 0,
            stop_reason: None,
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.success && self.stop_reason == Some(StopReason::Completed)
    }
}

/// Drives one provider against one tool executor.
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    executor: ToolExecutor,
    config: AgentLoopConfig,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn LLMProvider>, executor: ToolExecutor) -> Self {
        Self {
            provider,
            executor,
            config: AgentLoopConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentLoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Run until the model stops calling tools or the cap is reached.
    pub async fn run(&self, mut messages: Vec<Message>) -> AgentLoopOutcome {
        let run_id = Uuid::new_v4();
        let tools = tool_definitions::list().to_vec();
        let mut log: Vec<ToolCallRecord> = Vec::new();
        let mut last_text = String::new();
        let mut tool_executed = false;

        info!(
            %run_id,
            provider = self.provider.name(),
            max_iterations = self.config.max_iterations,
            "agent run started"
        );

        for iteration in 1..=self.config.max_iterations {
            let tool_choice = if tool_executed {
                ToolChoice::Auto
            } else {
                ToolChoice::Required
            };
            debug!(%run_id, iteration, ?tool_choice, "requesting step");

            let request = CompletionRequest::with_tools(messages.clone(), tools.clone(), tool_choice);
            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(%run_id, iteration, "provider error: {}", e);
                    return AgentLoopOutcome::failed(e.to_string());
                }
            };

            if response.tool_calls.is_empty() {
                if tool_choice == ToolChoice::Required {
                    warn!(%run_id, iteration, "forced turn answered without a tool call");
                    if !response.content.trim().is_empty() {
                        messages.push(Message::new(MessageRole::Assistant, response.content));
                    }
                    messages.push(Message::new(
                        MessageRole::User,
                        TOOL_REQUIRED_REMINDER.to_string(),
                    ));
                    continue;
                }

                info!(%run_id, iteration, tool_calls = log.len(), "agent run completed");
                return AgentLoopOutcome::finished(
                    response.content,
                    log,
                    iteration,
                    StopReason::Completed,
                );
            }

            if !response.content.trim().is_empty() {
                last_text = response.content.clone();
            }
            messages.push(Message::assistant_with_tool_calls(
                response.content,
                response.tool_calls.clone(),
            ));

            let results = join_all(
                response
                    .tool_calls
                    .iter()
                    .map(|call| self.executor.execute(call)),
            )
            .await;

            for (call, result) in response.tool_calls.iter().zip(results) {
                messages.push(Message::tool_result(call, result.to_message_content()));
                log.push(ToolCallRecord::new(call, &result));
            }
            tool_executed = true;
        }

        warn!(
            %run_id,
            max_iterations = self.config.max_iterations,
            "agent run stopped at iteration cap"
        );
        let content = if last_text.is_empty() {
            format!(
                "Stopped after {} iterations without a final answer. {} tool calls were executed.",
                self.config.max_iterations,
                log.len()
            )
        } else {
            last_text
        };
        AgentLoopOutcome::finished(
            content,
            log,
            self.config.max_iterations,
            StopReason::MaxIterations,
        )
    }
}

/// Entry point for callers: resolves a provider by model identifier and runs
/// the loop against a fresh executor for the given project.
pub struct AgentRuntime {
    registry: ProviderRegistry,
    notifier: ChangeNotifier,
    runner: Arc<dyn CommandRunner>,
    settings: ExecutorSettings,
    loop_config: AgentLoopConfig,
}

impl AgentRuntime {
    pub fn new(registry: ProviderRegistry, notifier: ChangeNotifier) -> Self {
        Self {
            registry,
            notifier,
            runner: Arc::new(ProcessRunner),
            settings: ExecutorSettings::default(),
            loop_config: AgentLoopConfig::default(),
        }
    }

    pub fn from_config(
        registry: ProviderRegistry,
        notifier: ChangeNotifier,
        config: &glow_config::Config,
    ) -> Self {
        Self {
            settings: ExecutorSettings::from(&config.agent),
            loop_config: AgentLoopConfig::from(&config.agent),
            ..Self::new(registry, notifier)
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Run the loop. A system prompt describing the project is prepended
    /// unless the history already starts with one.
    pub async fn run(
        &self,
        mut messages: Vec<Message>,
        model: Option<&str>,
        context: AgentContext,
    ) -> AgentLoopOutcome {
        let provider = match self.registry.get(model) {
            Ok(provider) => provider,
            Err(e) => return AgentLoopOutcome::failed(e.to_string()),
        };

        if messages.first().map(|m| m.role) != Some(MessageRole::System) {
            messages.insert(
                0,
                Message::new(MessageRole::System, agent_system_prompt(&context)),
            );
        }

        let executor = ToolExecutor::new(context, self.notifier.clone())
            .with_runner(self.runner.clone())
            .with_settings(self.settings.clone());

        AgentLoop::new(provider, executor)
            .with_config(self.loop_config)
            .run(messages)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = AgentLoopOutcome::finished(
            "done".to_string(),
            Vec::new(),
            2,
            StopReason::MaxIterations,
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["toolCalls"], serde_json::json!([]));
        assert_eq!(json["stopReason"], "max_iterations");
        assert!(json.get("error").is_none());

        let failed = serde_json::to_value(AgentLoopOutcome::failed("boom".to_string())).unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["error"], "boom");
    }
}
