pub mod gemini;
pub mod mock;
pub mod openai;
pub mod openai_compatible;

pub use gemini::GeminiProvider;
pub use mock::{MockProvider, MockResponse};
pub use openai::OpenAIProvider;
pub use openai_compatible::OpenAICompatibleProvider;

use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Errors raised by a model backend call.
///
/// A `ProviderError` aborts the run that triggered it and is reported to the
/// caller as-is. Nothing in the runtime retries on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} API error ({status}): {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("request to {provider} failed: {message}")]
    Transport { provider: String, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("provider '{0}' not found")]
    NotFound(String),
}

impl ProviderError {
    pub fn transport(provider: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion for the given messages
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse>;

    /// Get the provider name (`<type>.<config_name>`)
    fn name(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Whether image parts in user messages reach the model
    fn supports_vision(&self) -> bool {
        false
    }
}

/// How strongly the backend is asked to call a tool on this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Tools are not offered at all.
    #[default]
    None,
    /// The model may answer in text or call tools.
    Auto,
    /// The model must call at least one tool.
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<Tool>>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Plain request without tools (used for vision prompts).
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: None,
            tool_choice: ToolChoice::None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_tools(messages: Vec<Message>, tools: Vec<Tool>, tool_choice: ToolChoice) -> Self {
        Self {
            messages,
            tools: Some(tools),
            tool_choice,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Tools that should actually be declared on the wire.
    pub fn declared_tools(&self) -> Option<&[Tool]> {
        match (&self.tools, self.tool_choice) {
            (_, ToolChoice::None) => None,
            (Some(tools), _) if !tools.is_empty() => Some(tools.as_slice()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip)]
    pub images: Vec<ImageContent>,
    #[serde(skip)]
    pub id: String,
    /// Tool calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Correlation id of the call a `Tool` message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name a `Tool` message answers (Gemini replays results by name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Image content for multimodal messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    /// Media type (e.g., "image/png", "image/jpeg", "image/gif", "image/webp")
    pub media_type: String,
    /// Base64-encoded image data
    pub data: String,
}

impl ImageContent {
    pub fn new(media_type: &str, data: String) -> Self {
        Self {
            media_type: media_type.to_string(),
            data,
        }
    }

    /// Encode raw image bytes, sniffing the media type from the signature.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let media_type = Self::media_type_from_bytes(bytes).unwrap_or("image/png");
        Self::new(
            media_type,
            base64::engine::general_purpose::STANDARD.encode(bytes),
        )
    }

    /// `data:<media>;base64,<data>` form used by OpenAI and by UI consumers.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }

    /// Detect media type from image data magic bytes (file signature)
    pub fn media_type_from_bytes(bytes: &[u8]) -> Option<&'static str> {
        if bytes.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some("image/png");
        }

        // JPEG: FF D8 FF
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some("image/jpeg");
        }

        // GIF: 47 49 46 38 (GIF8)
        if bytes.starts_with(&[0x47, 0x49, 0x46, 0x38]) {
            return Some("image/gif");
        }

        // WebP: 52 49 46 46 ... 57 45 42 50 (RIFF....WEBP)
        if bytes.starts_with(&[0x52, 0x49, 0x46, 0x46]) && &bytes[8..12] == b"WEBP" {
            return Some("image/webp");
        }

        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A tool call as requested by the model. `id` correlates the call with its
/// result inside one run and has no meaning outside of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool: String,
    pub args: serde_json::Value,
}

/// Tool declaration in provider-neutral form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl Message {
    /// Generate a unique message ID in format HHMMSS-XXX
    /// where XXX are 3 random alphabetic characters (upper and lowercase)
    fn generate_id() -> String {
        let now = chrono::Local::now();
        let timestamp = now.format("%H%M%S").to_string();

        let mut rng = rand::thread_rng();
        let random_chars: String = (0..3)
            .map(|_| {
                let chars = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
                let idx = rng.gen_range(0..chars.len());
                chars[idx] as char
            })
            .collect();

        format!("{}-{}", timestamp, random_chars)
    }

    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            role,
            content,
            images: Vec::new(),
            id: Self::generate_id(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Assistant turn that requested tools.
    pub fn assistant_with_tool_calls(content: String, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    /// Result of one tool call, keyed by the call's correlation id.
    pub fn tool_result(call: &ToolCall, content: String) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.tool.clone()),
            ..Self::new(MessageRole::Tool, content)
        }
    }

    pub fn with_images(mut self, images: Vec<ImageContent>) -> Self {
        self.images = images;
        self
    }
}

/// The catalog in one adapter's declaration format: `openai`,
/// `openai_compatible` or `gemini`.
pub fn tool_declarations(provider_type: &str, tools: &[Tool]) -> ProviderResult<serde_json::Value> {
    match provider_type {
        "openai" | "openai_compatible" => Ok(serde_json::Value::Array(openai::convert_tools(tools))),
        "gemini" => serde_json::to_value(gemini::convert_tools(tools))
            .map_err(|e| ProviderError::MalformedResponse(e.to_string())),
        other => Err(ProviderError::NotFound(other.to_string())),
    }
}

/// Provider registry keyed by `<provider_type>.<config_name>`.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    order: Vec<String>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
            default_provider: String::new(),
        }
    }

    pub fn register<P: LLMProvider + 'static>(&mut self, provider: P) {
        self.register_arc(Arc::new(provider));
    }

    pub fn register_arc(&mut self, provider: Arc<dyn LLMProvider>) {
        let name = provider.name().to_string();
        if !self.providers.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.providers.insert(name.clone(), provider);

        if self.default_provider.is_empty() {
            self.default_provider = name;
        }
    }

    pub fn set_default(&mut self, provider_name: &str) -> ProviderResult<()> {
        if !self.providers.contains_key(provider_name) {
            return Err(ProviderError::NotFound(provider_name.to_string()));
        }
        self.default_provider = provider_name.to_string();
        Ok(())
    }

    /// Resolve a model identifier. Accepts a full `<type>.<name>` reference or
    /// a bare provider type, which resolves to the first provider of that type.
    pub fn get(&self, provider_name: Option<&str>) -> ProviderResult<Arc<dyn LLMProvider>> {
        let name = provider_name.unwrap_or(&self.default_provider);

        if let Some(provider) = self.providers.get(name) {
            return Ok(provider.clone());
        }

        let prefix = format!("{}.", name);
        self.order
            .iter()
            .find(|registered| registered.starts_with(&prefix))
            .and_then(|registered| self.providers.get(registered))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    pub fn list_providers(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_generation() {
        let msg = Message::new(MessageRole::User, "Hello".to_string());

        let parts: Vec<&str> = msg.id.split('-').collect();
        assert_eq!(parts.len(), 2, "Message ID should have format HHMMSS-XXX");
        assert_eq!(parts[0].len(), 6, "Timestamp should be 6 digits (HHMMSS)");
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 3);
        assert!(parts[1].chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_message_id_not_serialized() {
        let msg = Message::new(MessageRole::User, "Hello".to_string());
        let json = serde_json::to_string(&msg).unwrap();

        assert!(!json.contains("\"id\""), "JSON should not contain 'id' field");
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn test_tool_result_carries_correlation() {
        let call = ToolCall {
            id: "call_1".to_string(),
            tool: "read_file".to_string(),
            args: serde_json::json!({"file_path": "a.txt"}),
        };
        let msg = Message::tool_result(&call, "contents".to_string());

        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("read_file"));
    }

    #[test]
    fn test_declared_tools_respects_choice() {
        let tool = Tool {
            name: "t".to_string(),
            description: "d".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let msgs = vec![Message::new(MessageRole::User, "hi".to_string())];

        let none = CompletionRequest {
            tool_choice: ToolChoice::None,
            ..CompletionRequest::with_tools(msgs.clone(), vec![tool.clone()], ToolChoice::Auto)
        };
        assert!(none.declared_tools().is_none());

        let forced = CompletionRequest::with_tools(msgs, vec![tool], ToolChoice::Required);
        assert_eq!(forced.declared_tools().map(|t| t.len()), Some(1));
    }

    #[test]
    fn test_image_media_type_sniffing() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let image = ImageContent::from_bytes(&png);
        assert_eq!(image.media_type, "image/png");
        assert!(image.to_data_uri().starts_with("data:image/png;base64,"));

        assert_eq!(ImageContent::media_type_from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_registry_resolves_bare_type() {
        let mut registry = ProviderRegistry::new();
        registry.register(MockProvider::new().with_name("mock.first"));
        registry.register(MockProvider::new().with_name("mock.second"));

        assert_eq!(registry.default_name(), "mock.first");
        assert_eq!(registry.get(Some("mock.second")).unwrap().name(), "mock.second");
        assert_eq!(registry.get(Some("mock")).unwrap().name(), "mock.first");
        assert!(matches!(
            registry.get(Some("gemini.default")),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn test_tool_declarations_per_adapter() {
        let tools = vec![Tool {
            name: "read_file".to_string(),
            description: "Read a file".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }];

        let openai = tool_declarations("openai", &tools).unwrap();
        assert_eq!(openai[0]["type"], "function");
        assert_eq!(openai[0]["function"]["name"], "read_file");

        let gemini = tool_declarations("gemini", &tools).unwrap();
        assert_eq!(gemini[0]["functionDeclarations"][0]["name"], "read_file");

        assert!(tool_declarations("anthropic", &tools).is_err());
    }
}
