//! The observe / propose / act loop against one surface.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use glow_providers::{CompletionRequest, ImageContent, LLMProvider, Message, MessageRole};

use crate::action::{is_placeholder_reason, parse_action, BrowserAction, ScrollDirection};
use crate::error::{AutomationError, SurfaceError};
use crate::prompts::{observation_prompt, BROWSER_SYSTEM_PROMPT};
use crate::registry::SurfaceRegistry;
use crate::script;
use crate::surface::{InteractiveElement, Surface};

pub const DEFAULT_MAX_STEPS: usize = 10;

#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub max_steps: usize,
    /// How often to look for a surface after asking the host to open one.
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    /// Pause after an action so the page can react before the next screenshot.
    pub settle_delay: Duration,
    pub max_elements: usize,
    pub max_text_chars: usize,
    pub scroll_offset: i64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            poll_attempts: 10,
            poll_interval: Duration::from_millis(500),
            settle_delay: Duration::from_millis(500),
            max_elements: 50,
            max_text_chars: 3000,
            scroll_offset: 600,
        }
    }
}

impl From<&glow_config::BrowserConfig> for AutomationSettings {
    fn from(config: &glow_config::BrowserConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            poll_attempts: config.poll_attempts,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            settle_delay: Duration::from_millis(config.poll_interval_ms),
            max_elements: config.max_elements,
            max_text_chars: config.max_text_chars,
            scroll_offset: config.scroll_offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    MaxSteps,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub step: usize,
    pub action: BrowserAction,
    pub result: String,
}

/// Returned once when a run ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunResult {
    pub success: bool,
    pub status: RunStatus,
    pub steps: usize,
    pub actions: Vec<ActionRecord>,
    pub final_message: String,
    pub last_url: Option<String>,
    /// `data:image/png;base64,...`
    pub last_screenshot: Option<String>,
}

impl AgentRunResult {
    /// A run that ended before touching any surface.
    pub fn rejected(error: &AutomationError) -> Self {
        Self {
            success: false,
            status: RunStatus::Failed,
            steps: 0,
            actions: Vec::new(),
            final_message: error.to_string(),
            last_url: None,
            last_screenshot: None,
        }
    }
}

struct Observation {
    url: String,
    screenshot: Vec<u8>,
    elements: Vec<InteractiveElement>,
    text: String,
}

/// Accumulated state of one run.
struct RunLog {
    actions: Vec<ActionRecord>,
    history: Vec<String>,
    last_url: Option<String>,
    last_screenshot: Option<Vec<u8>>,
}

impl RunLog {
    fn record(&mut self, step: usize, action: BrowserAction, result: String) {
        self.history.push(format!("{} -> {}", action, result));
        self.actions.push(ActionRecord {
            step,
            action,
            result,
        });
    }

    fn finish(self, status: RunStatus, steps: usize, final_message: String) -> AgentRunResult {
        AgentRunResult {
            success: status == RunStatus::Done,
            status,
            steps,
            actions: self.actions,
            final_message,
            last_url: self.last_url,
            last_screenshot: self
                .last_screenshot
                .map(|bytes| ImageContent::from_bytes(&bytes).to_data_uri()),
        }
    }
}

pub struct BrowserAutomation {
    registry: Arc<SurfaceRegistry>,
    provider: Arc<dyn LLMProvider>,
    settings: AutomationSettings,
}

impl BrowserAutomation {
    pub fn new(registry: Arc<SurfaceRegistry>, provider: Arc<dyn LLMProvider>) -> Self {
        if !provider.supports_vision() {
            warn!(
                "provider {} does not declare vision support; screenshots may be ignored",
                provider.name()
            );
        }
        Self {
            registry,
            provider,
            settings: AutomationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AutomationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<SurfaceRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    /// Run a task and always produce a result.
    pub async fn run(&self, task: &str, max_steps: Option<usize>) -> AgentRunResult {
        match self.execute(task, max_steps).await {
            Ok(result) => result,
            Err(e) => AgentRunResult::rejected(&e),
        }
    }

    /// Run a task. Errors only for runs that never started: another run is in
    /// flight, or no surface could be resolved.
    pub async fn execute(
        &self,
        task: &str,
        max_steps: Option<usize>,
    ) -> Result<AgentRunResult, AutomationError> {
        let _guard = self.registry.try_begin_run()?;
        let surface = self.resolve_surface().await?;
        let max_steps = max_steps.unwrap_or(self.settings.max_steps).max(1);
        let run_id = Uuid::new_v4();
        info!(%run_id, surface = %surface.handle(), max_steps, "automation run started: {}", task);

        let mut log = RunLog {
            actions: Vec::new(),
            history: Vec::new(),
            last_url: None,
            last_screenshot: None,
        };

        for step in 1..=max_steps {
            let observation = match self.observe(surface.as_ref()).await {
                Ok(observation) => observation,
                Err(e) => return Ok(self.fail(log, step - 1, e.into()).await),
            };
            log.last_url = Some(observation.url.clone());
            log.last_screenshot = Some(observation.screenshot.clone());

            let action = match self.propose(task, observation, &log.history).await {
                Ok(action) => action,
                Err(e) => return Ok(self.fail(log, step - 1, e).await),
            };
            debug!(%run_id, step, "proposed: {}", action);

            if let BrowserAction::Done { reason } = &action {
                if is_placeholder_reason(reason) {
                    warn!(%run_id, step, "rejected placeholder answer: {}", reason);
                    log.record(
                        step,
                        action,
                        "Rejected: the done reason must contain the actual answer, not a completion notice"
                            .to_string(),
                    );
                    continue;
                }
                let answer = reason.clone();
                log.record(step, action, "Finished".to_string());
                info!(%run_id, step, "automation run done");
                return Ok(log.finish(RunStatus::Done, step, answer));
            }

            match self.act(surface.as_ref(), &action).await {
                Ok(result) => log.record(step, action, result),
                Err(e) if e.is_lost() => {
                    log.record(step, action, format!("Failed: {}", e));
                    return Ok(self.fail(log, step, e.into()).await);
                }
                // The model sees the failure on the next step.
                Err(e) => log.record(step, action, format!("Failed: {}", e)),
            }

            if !self.settings.settle_delay.is_zero() {
                tokio::time::sleep(self.settings.settle_delay).await;
            }
        }

        warn!(%run_id, max_steps, "automation run hit the step limit");
        self.capture_final(&mut log, surface.as_ref()).await;
        let message = format!(
            "Stopped after {} steps without a final answer. Last action: {}",
            max_steps,
            log.history.last().map(String::as_str).unwrap_or("none")
        );
        Ok(log.finish(RunStatus::MaxSteps, max_steps, message))
    }

    /// Registered surface, else auto-discovery, else ask the host to open one
    /// and poll for it.
    async fn resolve_surface(&self) -> Result<Arc<dyn Surface>, AutomationError> {
        match self.registry.resolve().await {
            Ok(surface) => return Ok(surface),
            Err(e) => debug!("no usable registered surface: {}", e),
        }
        if let Some(surface) = self.registry.auto_discover().await {
            return Ok(surface);
        }

        info!("no surface found, asking the host to open one");
        if let Err(e) = self.registry.host().request_open().await {
            warn!("host could not open a surface: {}", e);
        }
        for attempt in 1..=self.settings.poll_attempts {
            tokio::time::sleep(self.settings.poll_interval).await;
            if let Ok(surface) = self.registry.resolve().await {
                return Ok(surface);
            }
            if let Some(surface) = self.registry.auto_discover().await {
                debug!("surface appeared after {} polls", attempt);
                return Ok(surface);
            }
        }
        error!(
            "no surface appeared after {} polls",
            self.settings.poll_attempts
        );
        Err(AutomationError::SurfaceNotFound)
    }

    async fn observe(&self, surface: &dyn Surface) -> Result<Observation, SurfaceError> {
        let screenshot = surface.screenshot().await?;
        let url = surface.current_url().await?;
        let elements = script::interactive_elements(surface, self.settings.max_elements).await?;
        let text = script::visible_text(surface, self.settings.max_text_chars).await?;
        Ok(Observation {
            url,
            screenshot,
            elements,
            text,
        })
    }

    async fn propose(
        &self,
        task: &str,
        observation: Observation,
        history: &[String],
    ) -> Result<BrowserAction, AutomationError> {
        let prompt = observation_prompt(
            task,
            &observation.url,
            &observation.elements,
            &observation.text,
            history,
        );
        let messages = vec![
            Message::new(MessageRole::System, BROWSER_SYSTEM_PROMPT.to_string()),
            Message::new(MessageRole::User, prompt)
                .with_images(vec![ImageContent::from_bytes(&observation.screenshot)]),
        ];

        let response = self.provider.complete(CompletionRequest::new(messages)).await?;
        parse_action(&response.content)
    }

    async fn act(&self, surface: &dyn Surface, action: &BrowserAction) -> Result<String, SurfaceError> {
        match action {
            BrowserAction::Navigate { url, .. } => {
                surface.navigate(url).await?;
                Ok(format!("Navigated to {}", url))
            }
            BrowserAction::Click { selector, text, .. } => {
                let selector = selector.as_deref().filter(|s| !s.trim().is_empty());
                let text = text.as_deref().filter(|t| !t.trim().is_empty());
                if let Some(selector) = selector {
                    let outcome =
                        script::run_action(surface, &script::click_selector_script(selector)).await?;
                    if outcome.ok || text.is_none() {
                        return Ok(outcome_message(outcome));
                    }
                    debug!("selector {} missed, falling back to text match", selector);
                }
                match text {
                    Some(text) => Ok(outcome_message(
                        script::run_action(surface, &script::click_text_script(text)).await?,
                    )),
                    None => Ok("Failed: nothing to click".to_string()),
                }
            }
            BrowserAction::Type { selector, text, .. } => {
                let script = script::type_script(selector.as_deref(), text, action.should_submit());
                Ok(outcome_message(script::run_action(surface, &script).await?))
            }
            BrowserAction::Scroll { direction, .. } => {
                let offset = match direction {
                    ScrollDirection::Down => self.settings.scroll_offset,
                    ScrollDirection::Up => -self.settings.scroll_offset,
                };
                Ok(outcome_message(
                    script::run_action(surface, &script::scroll_script(offset)).await?,
                ))
            }
            BrowserAction::Extract { .. } => {
                let records = script::extract_records(surface, self.settings.max_elements).await?;
                if records.is_empty() {
                    Ok("No result-like records found on this page".to_string())
                } else {
                    Ok(format!(
                        "Extracted {} records: {}",
                        records.len(),
                        serde_json::Value::Array(records)
                    ))
                }
            }
            // Handled by the loop before dispatch.
            BrowserAction::Done { reason } => Ok(reason.clone()),
        }
    }

    /// Best-effort final URL and screenshot from whatever surface is still up.
    async fn capture_final(&self, log: &mut RunLog, surface: &dyn Surface) {
        let fallback = match surface.screenshot().await {
            Ok(bytes) => {
                log.last_screenshot = Some(bytes);
                if let Ok(url) = surface.current_url().await {
                    log.last_url = Some(url);
                }
                return;
            }
            Err(e) => {
                debug!("final screenshot failed: {}", e);
                self.registry.resolve().await.ok()
            }
        };
        if let Some(other) = fallback {
            if let Ok(bytes) = other.screenshot().await {
                log.last_screenshot = Some(bytes);
            }
            if let Ok(url) = other.current_url().await {
                log.last_url = Some(url);
            }
        }
    }

    async fn fail(&self, mut log: RunLog, steps: usize, error: AutomationError) -> AgentRunResult {
        error!("automation run failed: {}", error);
        if let Ok(surface) = self.registry.resolve().await {
            self.capture_final(&mut log, surface.as_ref()).await;
        }
        log.finish(RunStatus::Failed, steps, error.to_string())
    }
}

fn outcome_message(outcome: script::ScriptOutcome) -> String {
    if outcome.ok {
        outcome.message
    } else {
        format!("Failed: {}", outcome.message)
    }
}
