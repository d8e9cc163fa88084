//! OpenAI chat-completions adapter with native function calling.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::{
    CompletionRequest, CompletionResponse, LLMProvider, Message, MessageRole, ProviderError,
    ProviderResult, Tool, ToolCall, ToolChoice, Usage,
};

#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    name: String,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self::new_with_name(
            "openai".to_string(),
            api_key,
            model,
            base_url,
            max_tokens,
            temperature,
        )
    }

    pub fn new_with_name(
        name: String,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o".to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_tokens,
            temperature,
            name,
        }
    }

    pub(crate) fn create_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(&request.messages),
        });

        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_completion_tokens"] = json!(max_tokens);
        }

        if let Some(temperature) = request.temperature.or(self.temperature) {
            body["temperature"] = json!(temperature);
        }

        if let Some(tools) = request.declared_tools() {
            body["tools"] = json!(convert_tools(tools));
            body["tool_choice"] = tool_choice_value(request.tool_choice);
        }

        body
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        debug!(
            "Processing OpenAI completion request with {} messages (tool_choice={:?})",
            request.messages.len(),
            request.tool_choice
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

        let (content, tool_calls, usage) = parse_response(parsed)?;

        debug!(
            "OpenAI completion successful: {} tool calls, {} tokens generated",
            tool_calls.len(),
            usage.completion_tokens
        );

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
        true
    }
}

/// POST a chat-completions body and decode the response envelope.
pub(crate) async fn send_chat_completion(
    client: &Client,
    provider: &str,
    base_url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> ProviderResult<OpenAIResponse> {
    let response = client
        .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
        .header("Authorization", format!("Bearer {}", api_key))
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!("{} API error ({}): {}", provider, status, error_text);
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: error_text,
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    serde_json::from_str(&text)
        .map_err(|e| ProviderError::MalformedResponse(format!("{}: {}", provider, e)))
}

pub(crate) fn tool_choice_value(choice: ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Required => json!("required"),
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
    }
}

pub(crate) fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            MessageRole::System => json!({ "role": "system", "content": msg.content }),
            MessageRole::User if !msg.images.is_empty() => {
                let mut parts = vec![json!({ "type": "text", "text": msg.content })];
                parts.extend(msg.images.iter().map(|image| {
                    json!({
                        "type": "image_url",
                        "image_url": { "url": image.to_data_uri() }
                    })
                }));
                json!({ "role": "user", "content": parts })
            }
            MessageRole::User => json!({ "role": "user", "content": msg.content }),
            MessageRole::Assistant if !msg.tool_calls.is_empty() => {
                let calls: Vec<serde_json::Value> = msg
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.tool,
                                "arguments": call.args.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if msg.content.is_empty() {
                    serde_json::Value::Null
                } else {
                    json!(msg.content)
                };
                json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            MessageRole::Assistant => json!({ "role": "assistant", "content": msg.content }),
            MessageRole::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                "content": msg.content,
            }),
        })
        .collect()
}

pub(crate) fn convert_tools(tools: &[Tool]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

/// Pull text, tool calls and usage out of a decoded response.
pub(crate) fn parse_response(
    response: OpenAIResponse,
) -> ProviderResult<(String, Vec<ToolCall>, Usage)> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("response has no choices".to_string()))?;

    let content = choice.message.content.unwrap_or_default();
    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(OpenAIToolCall::into_tool_call)
        .collect::<ProviderResult<Vec<_>>>()?;

    let usage = response
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok((content, tool_calls, usage))
}

// OpenAI API response structures
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

impl OpenAIToolCall {
    fn into_tool_call(self) -> ProviderResult<ToolCall> {
        let raw = self.function.arguments.trim();
        let args = if raw.is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw).map_err(|e| {
                ProviderError::MalformedResponse(format!(
                    "arguments for '{}' are not valid JSON: {}",
                    self.function.name, e
                ))
            })?
        };

        Ok(ToolCall {
            id: self.id,
            tool: self.function.name,
            args,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
