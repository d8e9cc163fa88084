//! Provider registration: builds a `ProviderRegistry` from configuration.

use anyhow::{Context, Result};
use glow_config::Config;
use glow_providers::{GeminiProvider, OpenAICompatibleProvider, OpenAIProvider, ProviderRegistry};
use tracing::{debug, warn};

const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Empty keys in the config fall back to the environment.
fn api_key(configured: &str, env_var: &str, provider_ref: &str) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    match std::env::var(env_var) {
        Ok(key) if !key.is_empty() => {
            debug!("Using {} for {}", env_var, provider_ref);
            key
        }
        _ => {
            warn!("No API key configured for {} and {} is not set", provider_ref, env_var);
            String::new()
        }
    }
}

/// Register every configured provider and set the default.
pub fn register_providers(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    register_openai_providers(config, &mut registry);
    register_openai_compatible_providers(config, &mut registry);
    register_gemini_providers(config, &mut registry);

    debug!(
        "Setting default provider to: {}",
        config.providers.default_provider
    );
    registry
        .set_default(&config.providers.default_provider)
        .context("Default provider is not registered")?;

    Ok(registry)
}

fn register_openai_providers(config: &Config, registry: &mut ProviderRegistry) {
    for (name, openai_config) in &config.providers.openai {
        let provider_ref = format!("openai.{}", name);
        registry.register(OpenAIProvider::new_with_name(
            provider_ref.clone(),
            api_key(&openai_config.api_key, OPENAI_API_KEY_ENV, &provider_ref),
            Some(openai_config.model.clone()),
            openai_config.base_url.clone(),
            openai_config.max_tokens,
            openai_config.temperature,
        ));
    }
}

/// Compatible backends have their own keys; no environment fallback.
fn register_openai_compatible_providers(config: &Config, registry: &mut ProviderRegistry) {
    for (name, compat_config) in &config.providers.openai_compatible {
        registry.register(
            OpenAICompatibleProvider::new_with_name(
                format!("openai_compatible.{}", name),
                compat_config.api_key.clone(),
                compat_config.model.clone(),
                compat_config.base_url.clone(),
                compat_config.max_tokens,
                compat_config.temperature,
            )
            .with_vision(compat_config.vision),
        );
    }
}

fn register_gemini_providers(config: &Config, registry: &mut ProviderRegistry) {
    for (name, gemini_config) in &config.providers.gemini {
        let provider_ref = format!("gemini.{}", name);
        registry.register(GeminiProvider::new_with_name(
            provider_ref.clone(),
            api_key(&gemini_config.api_key, GEMINI_API_KEY_ENV, &provider_ref),
            Some(gemini_config.model.clone()),
            gemini_config.max_tokens,
            gemini_config.temperature,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const CONFIG: &str = r#"
[providers]
default_provider = "gemini.fast"

[providers.openai.default]
model = "gpt-4o"

[providers.openai_compatible.deepseek]
api_key = "sk-deepseek"
model = "deepseek-chat"
base_url = "https://api.deepseek.com/v1"

[providers.gemini.fast]
api_key = "g-key"
model = "gemini-2.0-flash"
"#;

    #[test]
    #[serial]
    fn test_registers_all_configured_providers() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let registry = register_providers(&config).unwrap();

        let mut names = registry.list_providers();
        names.sort();
        assert_eq!(
            names,
            vec!["gemini.fast", "openai.default", "openai_compatible.deepseek"]
        );
        assert_eq!(registry.default_name(), "gemini.fast");
        assert_eq!(registry.get(None).unwrap().model(), "gemini-2.0-flash");
        assert_eq!(
            registry.get(Some("openai_compatible")).unwrap().name(),
            "openai_compatible.deepseek"
        );
    }

    #[test]
    #[serial]
    fn test_empty_key_falls_back_to_environment() {
        std::env::set_var(OPENAI_API_KEY_ENV, "from-env");
        assert_eq!(api_key("", OPENAI_API_KEY_ENV, "openai.default"), "from-env");
        assert_eq!(
            api_key("configured", OPENAI_API_KEY_ENV, "openai.default"),
            "configured"
        );
        std::env::remove_var(OPENAI_API_KEY_ENV);
        assert_eq!(api_key("", OPENAI_API_KEY_ENV, "openai.default"), "");
    }
}
