//! Browser actions proposed by the vision model.
//!
//! Model output is untrusted: the first JSON object is pulled out of the
//! reply, checked field by field against the action's shape and then
//! validated. Anything that does not pass is rejected; nothing is guessed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use crate::error::AutomationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BrowserAction {
    Navigate {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Click {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Type {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        submit: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Scroll {
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Extract {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// `reason` carries the final answer.
    Done { reason: String },
}

/// Generic endings that are not an answer.
const PLACEHOLDER_REASONS: [&str; 9] = [
    "done",
    "complete",
    "completed",
    "finished",
    "task complete",
    "task completed",
    "task done",
    "search complete",
    "search completed",
];

fn allowed_fields(action: &str) -> Option<&'static [&'static str]> {
    match action {
        "navigate" => Some(&["action", "url", "reason"]),
        "click" => Some(&["action", "selector", "text", "reason"]),
        "type" => Some(&["action", "selector", "text", "submit", "reason"]),
        "scroll" => Some(&["action", "direction", "reason"]),
        "extract" => Some(&["action", "reason"]),
        "done" => Some(&["action", "reason"]),
        _ => None,
    }
}

fn invalid(message: impl Into<String>) -> AutomationError {
    AutomationError::InvalidAction(message.into())
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

impl BrowserAction {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserAction::Navigate { .. } => "navigate",
            BrowserAction::Click { .. } => "click",
            BrowserAction::Type { .. } => "type",
            BrowserAction::Scroll { .. } => "scroll",
            BrowserAction::Extract { .. } => "extract",
            BrowserAction::Done { .. } => "done",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            BrowserAction::Navigate { reason, .. }
            | BrowserAction::Click { reason, .. }
            | BrowserAction::Type { reason, .. }
            | BrowserAction::Scroll { reason, .. }
            | BrowserAction::Extract { reason } => reason.as_deref(),
            BrowserAction::Done { reason } => Some(reason),
        }
    }

    /// Whether a `type` action should submit its input.
    pub fn should_submit(&self) -> bool {
        match self {
            BrowserAction::Type { submit, reason, .. } => {
                submit.unwrap_or(false)
                    || reason
                        .as_deref()
                        .map(|r| r.to_lowercase().contains("search"))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    fn from_object(object: Map<String, Value>) -> Result<Self, AutomationError> {
        let name = object
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing \"action\" field"))?
            .to_string();
        let allowed = allowed_fields(&name).ok_or_else(|| invalid(format!("unknown action \"{}\"", name)))?;
        if let Some(unknown) = object.keys().find(|key| !allowed.contains(&key.as_str())) {
            return Err(invalid(format!("unexpected field \"{}\" for {}", unknown, name)));
        }

        let action: BrowserAction = serde_json::from_value(Value::Object(object))
            .map_err(|e| invalid(format!("{}: {}", name, e)))?;
        action.validate()?;
        Ok(action)
    }

    fn validate(&self) -> Result<(), AutomationError> {
        match self {
            BrowserAction::Navigate { url, .. } => {
                let parsed = Url::parse(url).map_err(|e| invalid(format!("bad url {:?}: {}", url, e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(invalid(format!("refusing to navigate to {} URL", parsed.scheme())));
                }
            }
            BrowserAction::Click { selector, text, .. } => {
                if !non_empty(selector) && !non_empty(text) {
                    return Err(invalid("click needs a selector or text"));
                }
            }
            BrowserAction::Type { text, .. } => {
                if text.is_empty() {
                    return Err(invalid("type needs text"));
                }
            }
            BrowserAction::Done { reason } => {
                if reason.trim().is_empty() {
                    return Err(invalid("done needs a reason carrying the answer"));
                }
            }
            BrowserAction::Scroll { .. } | BrowserAction::Extract { .. } => {}
        }
        Ok(())
    }
}

impl fmt::Display for BrowserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserAction::Navigate { url, .. } => write!(f, "navigate to {}", url),
            BrowserAction::Click {
                selector: Some(selector),
                ..
            } if !selector.trim().is_empty() => write!(f, "click {}", selector),
            BrowserAction::Click { text, .. } => {
                write!(f, "click \"{}\"", text.as_deref().unwrap_or_default())
            }
            BrowserAction::Type { text, .. } => {
                if self.should_submit() {
                    write!(f, "type \"{}\" and submit", text)
                } else {
                    write!(f, "type \"{}\"", text)
                }
            }
            BrowserAction::Scroll { direction, .. } => match direction {
                ScrollDirection::Up => f.write_str("scroll up"),
                ScrollDirection::Down => f.write_str("scroll down"),
            },
            BrowserAction::Extract { .. } => f.write_str("extract results"),
            BrowserAction::Done { reason } => write!(f, "done: {}", reason),
        }
    }
}

/// True when a `done` reason only says that something finished.
pub fn is_placeholder_reason(reason: &str) -> bool {
    let normalized = reason
        .trim()
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    normalized.is_empty() || PLACEHOLDER_REASONS.contains(&normalized.as_str())
}

fn fenced_json() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// The first balanced `{...}` in `text`, honoring JSON string escapes.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse exactly one action out of a model reply.
pub fn parse_action(reply: &str) -> Result<BrowserAction, AutomationError> {
    let candidate = fenced_json()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .or_else(|| first_object(reply))
        .ok_or_else(|| invalid("no JSON object in model reply"))?;

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => BrowserAction::from_object(object),
        Ok(_) => Err(invalid("action must be a JSON object")),
        Err(e) => Err(invalid(format!("malformed JSON: {}", e))),
    }
}
