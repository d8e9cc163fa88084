//! Agent loop tests driven by the mock provider.

use async_trait::async_trait;
use glow_core::{
    AgentContext, AgentLoop, AgentLoopConfig, AgentRuntime, ChangeNotifier, CommandRunner,
    CommandSpec, ExecutionResult, RecordingRunner, StopReason, ToolExecutor, ToolResult,
};
use glow_providers::mock::{MockProvider, MockResponse};
use glow_providers::{Message, MessageRole, ProviderError, ProviderRegistry, ToolChoice};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn executor(dir: &TempDir) -> ToolExecutor {
    ToolExecutor::new(AgentContext::new(dir.path()), ChangeNotifier::default())
        .with_runner(Arc::new(RecordingRunner::new()))
}

fn user(text: &str) -> Vec<Message> {
    vec![Message::new(MessageRole::User, text.to_string())]
}

#[tokio::test]
async fn test_loop_never_exceeds_iteration_cap() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_default_response(MockResponse::tool_call("list_files", json!({})));

    let outcome = AgentLoop::new(Arc::new(provider.clone()), executor(&dir))
        .run(user("keep going forever"))
        .await;

    assert_eq!(provider.request_count(), 10);
    assert!(outcome.success);
    assert_eq!(outcome.stop_reason, Some(StopReason::MaxIterations));
    assert_eq!(outcome.iterations, 10);
    assert_eq!(outcome.tool_calls.len(), 10);
    assert!(!outcome.is_complete());
}

#[tokio::test]
async fn test_configured_cap_is_respected() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_default_response(MockResponse::tool_call("list_files", json!({})));

    AgentLoop::new(Arc::new(provider.clone()), executor(&dir))
        .with_config(AgentLoopConfig { max_iterations: 3 })
        .run(user("loop"))
        .await;

    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn test_first_request_forces_a_tool_call() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::text("I would create the file for you."),
        MockResponse::tool_call(
            "create_file",
            json!({"file_path": "hello.txt", "content": "Hello"}),
        ),
        MockResponse::text("Created hello.txt"),
    ]);

    let outcome = AgentLoop::new(Arc::new(provider.clone()), executor(&dir))
        .run(user("create hello.txt"))
        .await;

    let requests = provider.get_requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].tool_choice, ToolChoice::Required);
    // Prose on a forced turn is not final; the next turn is forced again.
    assert_eq!(requests[1].tool_choice, ToolChoice::Required);
    assert_eq!(
        requests[1].messages.last().map(|m| m.role),
        Some(MessageRole::User)
    );
    assert_eq!(requests[2].tool_choice, ToolChoice::Auto);

    assert!(outcome.is_complete());
    assert_eq!(outcome.content.as_deref(), Some("Created hello.txt"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
        "Hello"
    );
}

#[tokio::test]
async fn test_every_request_declares_the_full_catalog() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_call("list_files", json!({})),
        MockResponse::text("done listing"),
    ]);

    AgentLoop::new(Arc::new(provider.clone()), executor(&dir))
        .run(user("list"))
        .await;

    for request in provider.get_requests() {
        assert_eq!(
            request.tools.as_deref(),
            Some(glow_core::tool_definitions::list())
        );
    }
}

#[tokio::test]
async fn test_provider_error_aborts_run() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_response(MockResponse::error(ProviderError::Http {
        provider: "mock".to_string(),
        status: 500,
        body: "upstream exploded".to_string(),
    }));

    let outcome = AgentLoop::new(Arc::new(provider.clone()), executor(&dir))
        .run(user("anything"))
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("upstream exploded"));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_failed_tool_is_folded_into_history() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_call("teleport", json!({"to": "mars"})),
        MockResponse::text("That tool does not exist."),
    ]);

    let outcome = AgentLoop::new(Arc::new(provider.clone()), executor(&dir))
        .run(user("go to mars"))
        .await;

    assert!(outcome.is_complete());
    assert!(!outcome.tool_calls[0].success);
    assert_eq!(
        outcome.tool_calls[0].error.as_deref(),
        Some("Unknown tool: teleport")
    );

    let second = &provider.get_requests()[1];
    let tool_message = second.messages.last().unwrap();
    assert_eq!(tool_message.role, MessageRole::Tool);
    let body: serde_json::Value = serde_json::from_str(&tool_message.content).unwrap();
    assert_eq!(body["success"], false);
}

/// Sleeps per command so completion order differs from request order.
#[derive(Default)]
struct SlowRunner {
    finished: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for SlowRunner {
    async fn run(&self, spec: &CommandSpec) -> ToolResult<ExecutionResult> {
        let command = spec.display();
        if command == "slow" {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        self.finished.lock().unwrap().push(command.clone());
        Ok(ExecutionResult::ok(&command))
    }
}

#[tokio::test]
async fn test_batch_runs_concurrently_and_keeps_emitted_order() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(SlowRunner::default());
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_calls(vec![
            ("run_command", json!({"command": "slow"})),
            ("run_command", json!({"command": "fast"})),
        ]),
        MockResponse::text("both ran"),
    ]);
    let executor = ToolExecutor::new(AgentContext::new(dir.path()), ChangeNotifier::default())
        .with_runner(runner.clone());

    let outcome = AgentLoop::new(Arc::new(provider.clone()), executor)
        .run(user("run both"))
        .await;

    assert_eq!(*runner.finished.lock().unwrap(), vec!["fast", "slow"]);

    let results: Vec<&str> = outcome
        .tool_calls
        .iter()
        .map(|c| c.result.as_deref().unwrap())
        .collect();
    assert_eq!(results, vec!["slow", "fast"]);

    let history = &provider.get_requests()[1].messages;
    let n = history.len();
    assert_eq!(history[n - 3].role, MessageRole::Assistant);
    assert_eq!(history[n - 3].tool_calls.len(), 2);
    assert_eq!(
        history[n - 2].tool_call_id.as_deref(),
        Some(history[n - 3].tool_calls[0].id.as_str())
    );
    assert_eq!(
        history[n - 1].tool_call_id.as_deref(),
        Some(history[n - 3].tool_calls[1].id.as_str())
    );
}

#[tokio::test]
async fn test_runtime_resolves_model_and_adds_system_prompt() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_name("mock.default").with_responses(vec![
        MockResponse::tool_call("list_files", json!({})),
        MockResponse::text("ok"),
    ]);
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone());

    let runtime = AgentRuntime::new(registry, ChangeNotifier::default())
        .with_runner(Arc::new(RecordingRunner::new()));
    let outcome = runtime
        .run(user("look around"), Some("mock"), AgentContext::new(dir.path()))
        .await;
    assert!(outcome.is_complete());

    let first = &provider.get_requests()[0];
    assert_eq!(first.messages[0].role, MessageRole::System);
    assert!(first.messages[0]
        .content
        .contains(&dir.path().display().to_string()));

    let missing = runtime
        .run(user("x"), Some("nope.none"), AgentContext::new(dir.path()))
        .await;
    assert!(!missing.success);
}
