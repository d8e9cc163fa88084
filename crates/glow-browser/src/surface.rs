//! Surface abstraction: a script-capable, screenshot-capable rendering target
//! and the host that owns the surfaces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::SurfaceError;

/// Opaque numeric handle. Holding one does not keep the surface alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceHandle(pub u64);

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// Explicitly tagged as an embedded content frame.
    ContentFrame,
    /// Any other window or tab.
    Window,
    /// The host application's own window.
    Main,
}

/// What the host reports about one currently rendered surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceInfo {
    pub handle: SurfaceHandle,
    pub kind: SurfaceKind,
    pub url: String,
}

/// A link, button or input visible on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub index: usize,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[async_trait]
pub trait Surface: Send + Sync {
    fn handle(&self) -> SurfaceHandle;

    async fn current_url(&self) -> Result<String, SurfaceError>;

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError>;

    /// Run a script in the page and return its JSON result.
    async fn execute_script(&self, script: &str) -> Result<Value, SurfaceError>;

    /// PNG bytes of the visible viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError>;
}

/// Enumerates and looks up surfaces. The host owns surface lifecycles.
#[async_trait]
pub trait SurfaceHost: Send + Sync {
    async fn surfaces(&self) -> Result<Vec<SurfaceInfo>, SurfaceError>;

    async fn get(&self, handle: SurfaceHandle) -> Option<Arc<dyn Surface>>;

    /// Ask the host UI to open a new surface. It may appear later or never.
    async fn request_open(&self) -> Result<(), SurfaceError>;
}
