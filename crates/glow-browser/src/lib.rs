//! Browser surfaces and the vision-driven automation loop that drives them.

pub mod action;
pub mod automation;
pub mod error;
pub mod mock;
pub mod prompts;
pub mod registry;
pub mod script;
pub mod server;
pub mod surface;
pub mod webdriver;

pub use action::{parse_action, BrowserAction, ScrollDirection};
pub use automation::{ActionRecord, AgentRunResult, AutomationSettings, BrowserAutomation, RunStatus};
pub use error::{AutomationError, SurfaceError};
pub use registry::{select_surface, RunGuard, SurfaceRegistry, DISCOVERY_HEURISTICS};
pub use surface::{InteractiveElement, Surface, SurfaceHandle, SurfaceHost, SurfaceInfo, SurfaceKind};
pub use webdriver::WebDriverHost;
