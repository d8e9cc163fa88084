//! The single "current surface" slot plus best-effort auto-discovery.
//!
//! There is exactly one automation target at a time. `register` and
//! `unregister` overwrite the slot; the registry never manages surface
//! lifecycles and every lookup fails closed when the surface is gone.

use serde_json::Value;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AutomationError, SurfaceError};
use crate::script;
use crate::surface::{InteractiveElement, Surface, SurfaceHandle, SurfaceHost, SurfaceInfo, SurfaceKind};

pub type Heuristic = fn(&SurfaceInfo) -> bool;

pub fn is_content_frame(info: &SurfaceInfo) -> bool {
    info.kind == SurfaceKind::ContentFrame
}

/// http(s) address whose host is not a loopback or unspecified address.
pub fn is_external_address(info: &SurfaceInfo) -> bool {
    let Ok(url) = Url::parse(&info.url) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host_str() {
        None => false,
        Some("localhost") => false,
        Some(host) => match host.trim_matches(['[', ']']).parse::<IpAddr>() {
            Ok(ip) => !(ip.is_loopback() || ip.is_unspecified()),
            Err(_) => !host.ends_with(".localhost"),
        },
    }
}

pub fn is_not_main_window(info: &SurfaceInfo) -> bool {
    info.kind != SurfaceKind::Main
}

/// Evaluated in order; the first heuristic that matches any surface wins.
pub const DISCOVERY_HEURISTICS: [(&str, Heuristic); 3] = [
    ("content frame", is_content_frame),
    ("external address", is_external_address),
    ("not the main window", is_not_main_window),
];

pub fn select_surface(surfaces: &[SurfaceInfo]) -> Option<&SurfaceInfo> {
    DISCOVERY_HEURISTICS.iter().find_map(|(name, matches)| {
        let found = surfaces.iter().find(|info| matches(info));
        if let Some(info) = found {
            debug!("auto-discovery picked {} ({})", info.handle, name);
        }
        found
    })
}

/// Held for the duration of one automation run.
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Single-writer registry of the current automation target.
pub struct SurfaceRegistry {
    host: Arc<dyn SurfaceHost>,
    slot: RwLock<Option<SurfaceHandle>>,
    busy: Arc<AtomicBool>,
}

impl SurfaceRegistry {
    pub fn new(host: Arc<dyn SurfaceHost>) -> Self {
        Self {
            host,
            slot: RwLock::new(None),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn host(&self) -> &Arc<dyn SurfaceHost> {
        &self.host
    }

    pub fn register(&self, handle: SurfaceHandle) {
        info!("registered surface {}", handle);
        *self.slot.write().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    pub fn unregister(&self) {
        if let Some(handle) = self.slot.write().unwrap_or_else(|p| p.into_inner()).take() {
            info!("unregistered surface {}", handle);
        }
    }

    pub fn current(&self) -> Option<SurfaceHandle> {
        *self.slot.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Clear the slot only if it still holds `handle`.
    fn forget(&self, handle: SurfaceHandle) {
        let mut slot = self.slot.write().unwrap_or_else(|p| p.into_inner());
        if *slot == Some(handle) {
            *slot = None;
        }
    }

    /// Look up the registered surface. A stale handle is dropped from the slot.
    pub async fn resolve(&self) -> Result<Arc<dyn Surface>, SurfaceError> {
        let handle = self.current().ok_or(SurfaceError::NotRegistered)?;
        match self.host.get(handle).await {
            Some(surface) => Ok(surface),
            None => {
                warn!("registered surface {} is gone", handle);
                self.forget(handle);
                Err(SurfaceError::Gone(handle))
            }
        }
    }

    /// Apply the discovery heuristics to whatever the host is rendering.
    pub async fn auto_discover(&self) -> Option<Arc<dyn Surface>> {
        let surfaces = match self.host.surfaces().await {
            Ok(surfaces) => surfaces,
            Err(e) => {
                warn!("surface enumeration failed: {}", e);
                return None;
            }
        };
        let handle = select_surface(&surfaces)?.handle;
        self.host.get(handle).await
    }

    /// Claim the registry for one automation run.
    pub fn try_begin_run(&self) -> Result<RunGuard, AutomationError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AutomationError::Busy)?;
        Ok(RunGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn current_url(&self) -> Result<String, SurfaceError> {
        self.resolve().await?.current_url().await
    }

    pub async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        self.resolve().await?.navigate(url).await
    }

    pub async fn execute_script(&self, script: &str) -> Result<Value, SurfaceError> {
        self.resolve().await?.execute_script(script).await
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError> {
        self.resolve().await?.screenshot().await
    }

    pub async fn list_interactive_elements(
        &self,
        max_elements: usize,
    ) -> Result<Vec<InteractiveElement>, SurfaceError> {
        let surface = self.resolve().await?;
        script::interactive_elements(surface.as_ref(), max_elements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(handle: u64, kind: SurfaceKind, url: &str) -> SurfaceInfo {
        SurfaceInfo {
            handle: SurfaceHandle(handle),
            kind,
            url: url.to_string(),
        }
    }

    #[test]
    fn test_external_address() {
        let external = |url| is_external_address(&info(1, SurfaceKind::Window, url));
        assert!(external("https://example.com/search?q=x"));
        assert!(external("http://93.184.216.34/"));
        assert!(!external("http://localhost:5173/"));
        assert!(!external("http://127.0.0.1:4100/"));
        assert!(!external("http://[::1]:3000/"));
        assert!(!external("http://app.localhost/"));
        assert!(!external("file:///tmp/index.html"));
        assert!(!external("about:blank"));
        assert!(!external("not a url"));
    }

    #[test]
    fn test_heuristics_apply_in_order() {
        let main = info(1, SurfaceKind::Main, "http://localhost:3000/");
        let tab = info(2, SurfaceKind::Window, "about:blank");
        let external = info(3, SurfaceKind::Window, "https://maps.example.com/");
        let frame = info(4, SurfaceKind::ContentFrame, "about:blank");

        let all = vec![main.clone(), tab.clone(), external.clone(), frame.clone()];
        assert_eq!(select_surface(&all), Some(&frame));

        let no_frame = vec![main.clone(), tab.clone(), external.clone()];
        assert_eq!(select_surface(&no_frame), Some(&external));

        let local_only = vec![main.clone(), tab.clone()];
        assert_eq!(select_surface(&local_only), Some(&tab));

        assert_eq!(select_surface(&[main]), None);
        assert_eq!(select_surface(&[]), None);
    }
}
