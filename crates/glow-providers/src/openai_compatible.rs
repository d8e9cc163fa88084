//! Single-shot variant of the chat-completions wire format.
//!
//! Some OpenAI-compatible backends (DeepSeek, Grok, local gateways) accept the
//! same request shape but misbehave when asked for several calls in one turn.
//! This adapter disables parallel calls and keeps only the first call the
//! backend returns, so every turn carries at most one tool request.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::openai::{
    convert_messages, convert_tools, parse_response, send_chat_completion, tool_choice_value,
};
use crate::{CompletionRequest, CompletionResponse, LLMProvider, ProviderResult};

#[derive(Clone)]
pub struct OpenAICompatibleProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    name: String,
    vision: bool,
}

impl OpenAICompatibleProvider {
    pub fn new_with_name(
        name: String,
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url,
            max_tokens,
            temperature,
            name,
            vision: false,
        }
    }

    /// Mark the backend as accepting `image_url` parts.
    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    pub(crate) fn create_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(&request.messages),
        });

        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(temperature) = request.temperature.or(self.temperature) {
            body["temperature"] = json!(temperature);
        }

        if let Some(tools) = request.declared_tools() {
            body["tools"] = json!(convert_tools(tools));
            body["tool_choice"] = tool_choice_value(request.tool_choice);
            body["parallel_tool_calls"] = json!(false);
        }

        body
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        debug!(
            "Processing {} single-shot request with {} messages",
            self.name,
            request.messages.len()
        );

        let body = self.create_request_body(&request);
        let parsed = send_chat_completion(
            &self.client,
            &self.name,
            &self.base_url,
            &self.api_key,
            &body,
        )
        .await?;

        let (content, mut tool_calls, usage) = parse_response(parsed)?;
        if tool_calls.len() > 1 {
            warn!(
                "{} returned {} tool calls; keeping the first",
                self.name,
                tool_calls.len()
            );
            tool_calls.truncate(1);
        }

        Ok(CompletionResponse {
            content,
            tool_calls,
            usage,
            model: self.model.clone(),
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, MessageRole, Tool, ToolChoice};

    fn provider() -> OpenAICompatibleProvider {
        OpenAICompatibleProvider::new_with_name(
            "openai_compatible.deepseek".to_string(),
            "key".to_string(),
            "deepseek-chat".to_string(),
            "https://api.deepseek.com/v1".to_string(),
            Some(2048),
            None,
        )
    }

    #[test]
    fn test_forced_single_shot_body() {
        let request = CompletionRequest::with_tools(
            vec![Message::new(MessageRole::User, "go".to_string())],
            vec![Tool {
                name: "run_command".to_string(),
                description: "Run".to_string(),
                input_schema: json!({"type": "object"}),
            }],
            ToolChoice::Required,
        );
        let body = provider().create_request_body(&request);

        assert_eq!(body["tool_choice"], "required");
        assert_eq!(body["parallel_tool_calls"], false);
        assert_eq!(body["max_tokens"], 2048);
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_vision_flag_defaults_off() {
        assert!(!provider().supports_vision());
        assert!(provider().with_vision(true).supports_vision());
    }
}
