//! Google Gemini adapter.
//!
//! Gemini declares tools as `functionDeclarations` and returns calls as
//! `functionCall` parts instead of a `tool_calls` array. Key differences from
//! the chat-completions family:
//!
//! - Gemini uses "model" instead of "assistant"
//! - System messages go in `systemInstruction`, not `contents`
//! - Tool results are replayed as `functionResponse` parts, matched by name
//! - Calls carry no id, so correlation ids are minted locally

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    CompletionRequest, CompletionResponse, LLMProvider, Message, MessageRole, ProviderError,
    ProviderResult, Tool, ToolCall, ToolChoice, Usage,
};

// ============================================================================
// Provider Struct
// ============================================================================

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    name: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self::new_with_name(
            "gemini".to_string(),
            api_key,
            model,
            max_tokens,
            temperature,
        )
    }

    pub fn new_with_name(
        name: String,
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            max_tokens: max_tokens.unwrap_or(8192),
            temperature: temperature.unwrap_or(0.1),
            name,
        }
    }

    fn api_url(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }

    fn build_request(&self, request: &CompletionRequest) -> GeminiRequest {
        let (contents, system_instruction) = convert_messages(&request.messages);
        let declared = request.declared_tools();
        GeminiRequest {
            contents,
            system_instruction,
            tools: declared.map(convert_tools),
            tool_config: declared.map(|_| GeminiToolConfig {
                function_calling_config: GeminiFunctionCallingConfig {
                    mode: calling_mode(request.tool_choice).to_string(),
                },
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.max_tokens.or(Some(self.max_tokens)),
                temperature: request.temperature.or(Some(self.temperature)),
            },
        }
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GeminiToolConfig>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolConfig {
    function_calling_config: GeminiFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionCallingConfig {
    mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

// ============================================================================
// Conversion
// ============================================================================

fn calling_mode(choice: ToolChoice) -> &'static str {
    match choice {
        ToolChoice::Required => "ANY",
        ToolChoice::Auto => "AUTO",
        ToolChoice::None => "NONE",
    }
}

fn convert_messages(messages: &[Message]) -> (Vec<GeminiContent>, Option<GeminiContent>) {
    let mut contents: Vec<GeminiContent> = Vec::new();
    let mut system_instruction = None;

    for msg in messages {
        match msg.role {
            MessageRole::System => {
                system_instruction = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::Text {
                        text: msg.content.clone(),
                    }],
                });
            }
            MessageRole::User => {
                let mut parts = vec![GeminiPart::Text {
                    text: msg.content.clone(),
                }];
                parts.extend(msg.images.iter().map(|image| GeminiPart::InlineData {
                    inline_data: GeminiInlineData {
                        mime_type: image.media_type.clone(),
                        data: image.data.clone(),
                    },
                }));
                contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts,
                });
            }
            MessageRole::Assistant => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(GeminiPart::Text {
                        text: msg.content.clone(),
                    });
                }
                parts.extend(msg.tool_calls.iter().map(|call| GeminiPart::FunctionCall {
                    function_call: GeminiFunctionCall {
                        name: call.tool.clone(),
                        args: call.args.clone(),
                    },
                }));
                contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts,
                });
            }
            MessageRole::Tool => {
                let part = GeminiPart::FunctionResponse {
                    function_response: GeminiFunctionResponse {
                        name: msg.name.clone().unwrap_or_default(),
                        response: serde_json::json!({ "content": msg.content }),
                    },
                };
                // All results for one model turn travel in a single content.
                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last
                                .parts
                                .iter()
                                .all(|p| matches!(p, GeminiPart::FunctionResponse { .. })) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    (contents, system_instruction)
}

pub(crate) fn convert_tools(tools: &[Tool]) -> Vec<GeminiTool> {
    let declarations = tools
        .iter()
        .map(|tool| GeminiFunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: if tool.input_schema.is_null() {
                None
            } else {
                Some(tool.input_schema.clone())
            },
        })
        .collect();

    vec![GeminiTool {
        function_declarations: declarations,
    }]
}

fn extract_text_from_parts(parts: &[GeminiPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn extract_tool_calls_from_parts(parts: &[GeminiPart]) -> Vec<ToolCall> {
    parts
        .iter()
        .filter_map(|part| match part {
            GeminiPart::FunctionCall { function_call } => Some(ToolCall {
                id: format!("call_{}", nanoid::nanoid!(8)),
                tool: function_call.name.clone(),
                args: if function_call.args.is_null() {
                    serde_json::json!({})
                } else {
                    function_call.args.clone()
                },
            }),
            _ => None,
        })
        .collect()
}

fn convert_usage(metadata: Option<&GeminiUsageMetadata>) -> Usage {
    metadata
        .map(|m| Usage {
            prompt_tokens: m.prompt_token_count.unwrap_or(0),
            completion_tokens: m.candidates_token_count.unwrap_or(0),
            total_tokens: m.total_token_count.unwrap_or(0),
        })
        .unwrap_or_default()
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        let gemini_request = self.build_request(&request);
        debug!(
            "Gemini request: model={}, contents={}, mode={:?}",
            self.model,
            gemini_request.contents.len(),
            gemini_request
                .tool_config
                .as_ref()
                .map(|c| c.function_calling_config.mode.as_str())
        );

        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error ({}): {}", status, error_text);
            return Err(ProviderError::Http {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: error_text,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        let gemini_response: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::MalformedResponse(format!("{}: {}", self.name, e)))?;

        parse_response(gemini_response, &self.model)
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

fn parse_response(response: GeminiResponse, model: &str) -> ProviderResult<CompletionResponse> {
    let content = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.content.as_ref())
        .ok_or_else(|| {
            ProviderError::MalformedResponse("Gemini response has no candidate content".to_string())
        })?;

    Ok(CompletionResponse {
        content: extract_text_from_parts(&content.parts),
        tool_calls: extract_tool_calls_from_parts(&content.parts),
        usage: convert_usage(response.usage_metadata.as_ref()),
        model: model.to_string(),
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
