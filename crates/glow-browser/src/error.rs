use glow_providers::ProviderError;

use crate::surface::SurfaceHandle;

/// Failures of a surface operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurfaceError {
    #[error("no surface registered")]
    NotRegistered,

    #[error("surface {0} not found")]
    NotFound(SurfaceHandle),

    /// The surface existed but has since been closed.
    #[error("surface {0} is gone")]
    Gone(SurfaceHandle),

    #[error("script failed: {0}")]
    Script(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("webdriver error: {0}")]
    Driver(String),
}

impl SurfaceError {
    /// The target no longer exists; a run cannot continue against it.
    pub fn is_lost(&self) -> bool {
        matches!(
            self,
            SurfaceError::NotRegistered | SurfaceError::NotFound(_) | SurfaceError::Gone(_)
        )
    }
}

/// Failures of an automation run. Only `Busy` and `SurfaceNotFound` reach the
/// caller as errors; everything else ends the run as `failed`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AutomationError {
    #[error("No browser surface is available. Open a browser view manually and try again.")]
    SurfaceNotFound,

    #[error("another automation run is already in progress")]
    Busy,

    #[error("vision model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("model proposed an invalid action: {0}")]
    InvalidAction(String),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}
