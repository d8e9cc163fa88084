use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Locations searched, in order, when no explicit path is given.
const DEFAULT_PATHS: [&str; 3] = ["./glow.toml", "~/.config/glow/config.toml", "~/.glow.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// Provider configuration with named configs per provider type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Default provider in format "<provider_type>.<config_name>"
    pub default_provider: String,

    /// Provider for the browser automation loop (optional, falls back to default_provider)
    pub vision_provider: Option<String>,

    /// Named OpenAI provider configs
    #[serde(default)]
    pub openai: HashMap<String, OpenAIConfig>,

    /// Named single-shot OpenAI-compatible configs (deepseek, grok, local gateways)
    #[serde(default)]
    pub openai_compatible: HashMap<String, OpenAICompatibleConfig>,

    /// Named Gemini provider configs
    #[serde(default)]
    pub gemini: HashMap<String, GeminiConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Empty means "read OPENAI_API_KEY at registration time"
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAICompatibleConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub vision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Empty means "read GEMINI_API_KEY at registration time"
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub command_timeout_secs: u64,
    pub max_output_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            command_timeout_secs: 60,
            max_output_chars: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub max_steps: usize,
    /// How many times to look for a surface after asking the host to open one
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub max_elements: usize,
    pub max_text_chars: usize,
    pub scroll_offset: i64,
    pub webdriver_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            poll_attempts: 10,
            poll_interval_ms: 500,
            max_elements: 50,
            max_text_chars: 3000,
            scroll_offset: 600,
            webdriver_url: "http://localhost:4444".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            debounce_ms: 300,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut openai_configs = HashMap::new();
        openai_configs.insert(
            "default".to_string(),
            OpenAIConfig {
                api_key: String::new(),
                model: "gpt-4o".to_string(),
                base_url: None,
                max_tokens: Some(4096),
                temperature: Some(0.1),
            },
        );

        Self {
            providers: ProvidersConfig {
                default_provider: "openai.default".to_string(),
                vision_provider: None,
                openai: openai_configs,
                openai_compatible: HashMap::new(),
                gemini: HashMap::new(),
            },
            agent: AgentConfig::default(),
            browser: BrowserConfig::default(),
            server: ServerConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the first default location that
    /// exists. When nothing is found a default file is written under
    /// `~/.config/glow/` and the defaults are returned.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        if let Some(path) = config_path {
            let expanded = shellexpand::tilde(path).to_string();
            if !Path::new(&expanded).exists() {
                anyhow::bail!("Config file '{}' does not exist", expanded);
            }
            return Self::load_file(Path::new(&expanded));
        }

        let found = DEFAULT_PATHS.iter().find_map(|path| {
            let expanded = shellexpand::tilde(path).to_string();
            Path::new(&expanded).exists().then(|| PathBuf::from(expanded))
        });

        match found {
            Some(path) => Self::load_file(&path),
            None => {
                let default_config = Self::default();
                let config_dir = dirs::home_dir()
                    .map(|home| home.join(".config").join("glow"))
                    .unwrap_or_else(|| PathBuf::from("."));

                let config_file = config_dir.join("config.toml");
                let saved = std::fs::create_dir_all(&config_dir)
                    .map_err(anyhow::Error::from)
                    .and_then(|_| default_config.save(&config_file));
                match saved {
                    Ok(()) => info!(
                        "Created default configuration at: {}",
                        config_file.display()
                    ),
                    Err(e) => warn!("Could not save default config: {}", e),
                }

                Ok(default_config)
            }
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.validate_provider_reference(&self.providers.default_provider)?;
        if let Some(vision) = &self.providers.vision_provider {
            self.validate_provider_reference(vision)?;
        }
        if self.agent.max_iterations == 0 {
            anyhow::bail!("agent.max_iterations must be at least 1");
        }
        if self.browser.max_steps == 0 {
            anyhow::bail!("browser.max_steps must be at least 1");
        }
        Ok(())
    }

    /// Validate a provider reference (format: "<provider_type>.<config_name>")
    pub fn validate_provider_reference(&self, reference: &str) -> Result<()> {
        self.get_provider_config(reference).map(|_| ())
    }

    /// Parse a provider reference into (provider_type, config_name)
    pub fn parse_provider_reference(reference: &str) -> Result<(String, String)> {
        match reference.split_once('.') {
            Some((provider_type, config_name))
                if !provider_type.is_empty()
                    && !config_name.is_empty()
                    && !config_name.contains('.') =>
            {
                Ok((provider_type.to_string(), config_name.to_string()))
            }
            _ => anyhow::bail!(
                "Invalid provider reference '{}'. Expected format: '<provider_type>.<config_name>'",
                reference
            ),
        }
    }

    /// Look up the config entry a reference points at.
    pub fn get_provider_config(&self, reference: &str) -> Result<ProviderConfigRef<'_>> {
        let (provider_type, config_name) = Self::parse_provider_reference(reference)?;

        let found = match provider_type.as_str() {
            "openai" => self
                .providers
                .openai
                .get(&config_name)
                .map(ProviderConfigRef::OpenAI),
            "openai_compatible" => self
                .providers
                .openai_compatible
                .get(&config_name)
                .map(ProviderConfigRef::OpenAICompatible),
            "gemini" => self
                .providers
                .gemini
                .get(&config_name)
                .map(ProviderConfigRef::Gemini),
            other => anyhow::bail!(
                "Unknown provider type '{}'. Valid types: openai, openai_compatible, gemini",
                other
            ),
        };

        found.ok_or_else(|| {
            anyhow::anyhow!(
                "Provider config '{}' not found. Available: {:?}",
                reference,
                self.provider_references()
            )
        })
    }

    /// Every configured provider as a "<type>.<name>" reference, sorted.
    pub fn provider_references(&self) -> Vec<String> {
        let mut references: Vec<String> = self
            .providers
            .openai
            .keys()
            .map(|name| format!("openai.{}", name))
            .chain(
                self.providers
                    .openai_compatible
                    .keys()
                    .map(|name| format!("openai_compatible.{}", name)),
            )
            .chain(
                self.providers
                    .gemini
                    .keys()
                    .map(|name| format!("gemini.{}", name)),
            )
            .collect();
        references.sort();
        references
    }

    /// Provider used by the browser automation loop.
    pub fn vision_provider(&self) -> &str {
        self.providers
            .vision_provider
            .as_deref()
            .unwrap_or(&self.providers.default_provider)
    }

    /// Create a copy of the config with a different default provider
    pub fn with_provider_override(&self, provider_ref: &str) -> Result<Self> {
        self.validate_provider_reference(provider_ref)?;

        let mut config = self.clone();
        config.providers.default_provider = provider_ref.to_string();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }
}

/// Reference to a provider configuration
#[derive(Debug)]
pub enum ProviderConfigRef<'a> {
    OpenAI(&'a OpenAIConfig),
    OpenAICompatible(&'a OpenAICompatibleConfig),
    Gemini(&'a GeminiConfig),
}

#[cfg(test)]
mod tests;
