use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use glow_browser::{server, AutomationSettings, BrowserAutomation, SurfaceRegistry, WebDriverHost};
use glow_config::Config;
use glow_core::watcher::debounced;
use glow_core::{
    register_providers, AgentContext, AgentRuntime, ChangeNotifier, ChangeWatcher, Message,
    MessageRole,
};

pub fn print_tools(format: &str) -> Result<()> {
    let declarations = glow_providers::tool_declarations(format, glow_core::tool_definitions::list())
        .with_context(|| format!("Unknown declaration format '{}'", format))?;
    println!("{}", serde_json::to_string_pretty(&declarations)?);
    Ok(())
}

/// Log debounced changes until the notifier is dropped.
fn log_changes(notifier: &ChangeNotifier, window: Duration) -> JoinHandle<()> {
    let mut changes = debounced(notifier.subscribe(), window);
    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            info!(path = %change.path.display(), kind = ?change.kind, "workspace changed");
        }
    })
}

pub async fn run_agent(
    config: &Config,
    workspace_dir: PathBuf,
    task: &str,
    model: Option<&str>,
) -> Result<()> {
    let registry = register_providers(config)?;
    let notifier = ChangeNotifier::default();
    let logger = log_changes(&notifier, Duration::from_millis(config.watcher.debounce_ms));

    let runtime = AgentRuntime::from_config(registry, notifier, config);
    let outcome = runtime
        .run(
            vec![Message::new(MessageRole::User, task.to_string())],
            model,
            AgentContext::new(workspace_dir),
        )
        .await;
    drop(runtime);
    let _ = logger.await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        bail!(
            "Agent run failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn automation(
    config: &Config,
    webdriver: Option<&str>,
    headless: bool,
) -> Result<(Arc<WebDriverHost>, BrowserAutomation)> {
    let providers = register_providers(config)?;
    let provider = providers
        .get(Some(config.vision_provider()))
        .context("Vision provider is not registered")?;

    let url = webdriver.unwrap_or(&config.browser.webdriver_url);
    let host = Arc::new(WebDriverHost::connect(url, headless).await?);
    let registry = Arc::new(SurfaceRegistry::new(host.clone()));
    let automation = BrowserAutomation::new(registry, provider)
        .with_settings(AutomationSettings::from(&config.browser));
    Ok((host, automation))
}

pub async fn browse(
    config: &Config,
    task: &str,
    max_steps: Option<usize>,
    webdriver: Option<&str>,
    headless: bool,
) -> Result<()> {
    let (host, automation) = automation(config, webdriver, headless).await?;
    let result = automation.run(task, max_steps).await;
    if let Err(e) = host.quit().await {
        warn!("{:#}", e);
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!("Browser task ended with status {:?}", result.status);
    }
    Ok(())
}

pub async fn serve(
    config: &Config,
    workspace_dir: PathBuf,
    port: Option<u16>,
    webdriver: Option<&str>,
) -> Result<()> {
    // Keep the notifier alive for the lifetime of the server.
    let notifier = ChangeNotifier::default();
    if config.watcher.enabled {
        ChangeWatcher::new(
            &workspace_dir,
            notifier.clone(),
            Duration::from_millis(config.watcher.poll_interval_ms),
        )
        .spawn();
        log_changes(&notifier, Duration::from_millis(config.watcher.debounce_ms));
        info!("watching {}", workspace_dir.display());
    }

    let (_host, automation) = automation(config, webdriver, false).await?;
    let listener = server::bind(&config.server.host, port.unwrap_or(config.server.port)).await?;
    server::serve(listener, Arc::new(automation)).await
}
