//! Mock LLM Provider for Testing
//!
//! A scripted provider for integration tests. Responses are served in order,
//! every request is recorded for later inspection, and clones share both
//! queues so a test can keep a handle after registering the provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use glow_providers::mock::{MockProvider, MockResponse};
//!
//! let provider = MockProvider::new().with_responses(vec![
//!     MockResponse::tool_call("list_files", json!({"path": "."})),
//!     MockResponse::text("Two files."),
//! ]);
//! ```

use crate::{
    CompletionRequest, CompletionResponse, LLMProvider, ProviderError, ProviderResult, ToolCall,
    Usage,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Global counter for generating unique tool call IDs
static TOOL_CALL_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_call_id() -> String {
    format!("call_{}", TOOL_CALL_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// A scripted turn.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply {
        content: String,
        tool_calls: Vec<ToolCall>,
        usage: Usage,
    },
    Error(ProviderError),
}

impl MockResponse {
    /// Text-only answer.
    pub fn text(content: &str) -> Self {
        Self::Reply {
            content: content.to_string(),
            tool_calls: Vec::new(),
            usage: Usage {
                prompt_tokens: 100,
                completion_tokens: content.len() as u32 / 4,
                total_tokens: 100 + content.len() as u32 / 4,
            },
        }
    }

    /// A single native tool call.
    pub fn tool_call(tool: &str, args: serde_json::Value) -> Self {
        Self::tool_calls(vec![(tool, args)])
    }

    /// Several tool calls in one turn, in the order given.
    pub fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        Self::Reply {
            content: String::new(),
            tool_calls: calls
                .into_iter()
                .map(|(tool, args)| ToolCall {
                    id: next_call_id(),
                    tool: tool.to_string(),
                    args,
                })
                .collect(),
            usage: Usage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            },
        }
    }

    /// Text followed by a tool call in the same turn.
    pub fn text_then_tool(text: &str, tool: &str, args: serde_json::Value) -> Self {
        match Self::tool_call(tool, args) {
            Self::Reply {
                tool_calls, usage, ..
            } => Self::Reply {
                content: text.to_string(),
                tool_calls,
                usage,
            },
            other => other,
        }
    }

    /// The backend fails with this error.
    pub fn error(error: ProviderError) -> Self {
        Self::Error(error)
    }
}

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    vision: bool,
    delay: Option<Duration>,
    /// Queue of responses to return (FIFO)
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// All requests received (for verification)
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Served once the queue runs dry
    default_response: Option<MockResponse>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            vision: false,
            delay: None,
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add a response to the queue
    pub fn with_response(self, response: MockResponse) -> Self {
        lock(&self.responses).push(response);
        self
    }

    /// Add multiple responses to the queue
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        lock(&self.responses).extend(responses);
        self
    }

    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Get all requests that were made to this provider
    pub fn get_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_response(&self) -> MockResponse {
        let mut responses = lock(&self.responses);
        if responses.is_empty() {
            self.default_response.clone().unwrap_or_else(|| {
                MockResponse::error(ProviderError::MalformedResponse(
                    "mock provider has no scripted responses left".to_string(),
                ))
            })
        } else {
            responses.remove(0)
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        lock(&self.requests).push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_response() {
            MockResponse::Reply {
                content,
                tool_calls,
                usage,
            } => Ok(CompletionResponse {
                content,
                tool_calls,
                usage,
                model: self.model.clone(),
            }),
            MockResponse::Error(error) => Err(error),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }
}
