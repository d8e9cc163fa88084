use crate::{Config, ProviderConfigRef};
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> String {
    let config_path = dir.path().join("test_config.toml");
    fs::write(&config_path, content).unwrap();
    config_path.to_str().unwrap().to_string()
}

#[test]
fn test_minimal_config_uses_section_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
[providers]
default_provider = "openai.default"

[providers.openai.default]
api_key = "sk-test"
model = "gpt-4o"
"#,
    );

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.agent.max_iterations, 10);
    assert_eq!(config.agent.command_timeout_secs, 60);
    assert_eq!(config.browser.max_steps, 10);
    assert_eq!(config.browser.poll_attempts, 10);
    assert_eq!(config.browser.webdriver_url, "http://localhost:4444");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 4100);
    assert!(config.watcher.enabled);
    assert_eq!(config.watcher.debounce_ms, 300);
}

#[test]
fn test_vision_provider_falls_back_to_default() {
    let config = Config::from_toml_str(
        r#"
[providers]
default_provider = "openai.default"

[providers.openai.default]
model = "gpt-4o"
"#,
    )
    .unwrap();
    assert_eq!(config.vision_provider(), "openai.default");

    let config = Config::from_toml_str(
        r#"
[providers]
default_provider = "openai_compatible.deepseek"
vision_provider = "gemini.default"

[providers.openai_compatible.deepseek]
api_key = "k"
model = "deepseek-chat"
base_url = "https://api.deepseek.com/v1"

[providers.gemini.default]
api_key = "g"
model = "gemini-2.0-flash"
"#,
    )
    .unwrap();
    assert_eq!(config.vision_provider(), "gemini.default");
    assert!(matches!(
        config.get_provider_config("openai_compatible.deepseek").unwrap(),
        ProviderConfigRef::OpenAICompatible(c) if !c.vision
    ));
}

#[test]
fn test_invalid_provider_references() {
    let missing = Config::from_toml_str(
        r#"
[providers]
default_provider = "openai.nope"

[providers.openai.default]
model = "gpt-4o"
"#,
    )
    .unwrap_err();
    assert!(format!("{:#}", missing).contains("not found"));

    let unknown = Config::from_toml_str(
        r#"
[providers]
default_provider = "anthropic.default"
"#,
    )
    .unwrap_err();
    assert!(format!("{:#}", unknown).contains("Unknown provider type"));

    let malformed = Config::from_toml_str(
        r#"
[providers]
default_provider = "openai"
"#,
    )
    .unwrap_err();
    assert!(format!("{:#}", malformed).contains("Expected format"));
}

#[test]
fn test_zero_caps_are_rejected() {
    let err = Config::from_toml_str(
        r#"
[providers]
default_provider = "openai.default"

[providers.openai.default]
model = "gpt-4o"

[agent]
max_iterations = 0
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("max_iterations"));
}

#[test]
fn test_missing_explicit_path_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");
    assert!(Config::load(Some(path.to_str().unwrap())).is_err());
}

#[test]
fn test_save_and_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("saved.toml");

    let mut config = Config::default();
    config.server.port = 5005;
    config.save(&path).unwrap();

    let reloaded = Config::load(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(reloaded.server.port, 5005);
    assert_eq!(reloaded.providers.default_provider, "openai.default");
}

#[test]
fn test_provider_override() {
    let config = Config::from_toml_str(
        r#"
[providers]
default_provider = "openai.default"

[providers.openai.default]
model = "gpt-4o"

[providers.gemini.fast]
model = "gemini-2.0-flash"
"#,
    )
    .unwrap();

    let overridden = config.with_provider_override("gemini.fast").unwrap();
    assert_eq!(overridden.providers.default_provider, "gemini.fast");
    assert!(config.with_provider_override("gemini.slow").is_err());
    assert_eq!(
        config.provider_references(),
        vec!["gemini.fast".to_string(), "openai.default".to_string()]
    );
}
