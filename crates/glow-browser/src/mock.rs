//! In-memory surfaces for tests and dry runs.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::SurfaceError;
use crate::script::script_kind;
use crate::surface::{InteractiveElement, Surface, SurfaceHandle, SurfaceHost, SurfaceInfo, SurfaceKind};

/// 1x1 transparent PNG.
pub const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// A scripted page. Observation scripts return the configured data; action
/// scripts succeed unless the page has been closed.
pub struct MockSurface {
    handle: SurfaceHandle,
    url: Mutex<String>,
    closed: AtomicBool,
    elements: Mutex<Vec<InteractiveElement>>,
    text: Mutex<String>,
    records: Mutex<Vec<Value>>,
    scripts: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    close_after: Mutex<Option<String>>,
}

impl MockSurface {
    pub fn new(handle: u64, url: &str) -> Self {
        Self {
            handle: SurfaceHandle(handle),
            url: Mutex::new(url.to_string()),
            closed: AtomicBool::new(false),
            elements: Mutex::new(Vec::new()),
            text: Mutex::new(String::new()),
            records: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            close_after: Mutex::new(None),
        }
    }

    pub fn with_elements(self, elements: Vec<InteractiveElement>) -> Self {
        *lock(&self.elements) = elements;
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        *lock(&self.text) = text.to_string();
        self
    }

    pub fn with_records(self, records: Vec<Value>) -> Self {
        *lock(&self.records) = records;
        self
    }

    /// Close the page right after the first script of `kind` has run.
    pub fn closing_after(self, kind: &str) -> Self {
        *lock(&self.close_after) = Some(kind.to_string());
        self
    }

    /// Simulate the page being closed by its owner.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Kinds of every script run so far, in order.
    pub fn script_kinds(&self) -> Vec<String> {
        lock(&self.scripts)
            .iter()
            .map(|s| script_kind(s).unwrap_or("raw").to_string())
            .collect()
    }

    pub fn scripts(&self) -> Vec<String> {
        lock(&self.scripts).clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).clone()
    }

    fn check_open(&self) -> Result<(), SurfaceError> {
        if self.is_closed() {
            Err(SurfaceError::Gone(self.handle))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Surface for MockSurface {
    fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        self.check_open()?;
        Ok(lock(&self.url).clone())
    }

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        self.check_open()?;
        lock(&self.navigations).push(url.to_string());
        *lock(&self.url) = url.to_string();
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<Value, SurfaceError> {
        self.check_open()?;
        lock(&self.scripts).push(script.to_string());
        let value = match script_kind(script) {
            Some("elements") => serde_json::to_value(&*lock(&self.elements))
                .map_err(|e| SurfaceError::Script(e.to_string()))?,
            Some("text") => Value::String(lock(&self.text).clone()),
            Some("extract") => Value::Array(lock(&self.records).clone()),
            Some(kind) => json!({"ok": true, "message": format!("{} ok", kind)}),
            None => Value::Null,
        };
        let closing = lock(&self.close_after)
            .as_deref()
            .map_or(false, |kind| script_kind(script) == Some(kind));
        if closing {
            self.close();
        }
        Ok(value)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError> {
        self.check_open()?;
        Ok(BLANK_PNG.to_vec())
    }
}

struct MockEntry {
    info: SurfaceInfo,
    surface: Arc<MockSurface>,
}

/// A host with a fixed set of surfaces. `request_open` can optionally make a
/// pending surface appear.
#[derive(Default)]
pub struct MockSurfaceHost {
    entries: Mutex<Vec<MockEntry>>,
    pending: Mutex<Option<(SurfaceKind, Arc<MockSurface>)>>,
    open_requests: AtomicUsize,
}

impl MockSurfaceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(self, kind: SurfaceKind, surface: Arc<MockSurface>) -> Self {
        self.add(kind, surface);
        self
    }

    /// Surface that shows up once `request_open` is called.
    pub fn with_pending(self, kind: SurfaceKind, surface: Arc<MockSurface>) -> Self {
        *lock(&self.pending) = Some((kind, surface));
        self
    }

    pub fn add(&self, kind: SurfaceKind, surface: Arc<MockSurface>) {
        let info = SurfaceInfo {
            handle: surface.handle(),
            kind,
            url: lock(&surface.url).clone(),
        };
        lock(&self.entries).push(MockEntry { info, surface });
    }

    pub fn open_requests(&self) -> usize {
        self.open_requests.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SurfaceHost for MockSurfaceHost {
    async fn surfaces(&self) -> Result<Vec<SurfaceInfo>, SurfaceError> {
        Ok(lock(&self.entries)
            .iter()
            .filter(|entry| !entry.surface.is_closed())
            .map(|entry| SurfaceInfo {
                url: lock(&entry.surface.url).clone(),
                ..entry.info.clone()
            })
            .collect())
    }

    async fn get(&self, handle: SurfaceHandle) -> Option<Arc<dyn Surface>> {
        lock(&self.entries)
            .iter()
            .find(|entry| entry.info.handle == handle && !entry.surface.is_closed())
            .map(|entry| entry.surface.clone() as Arc<dyn Surface>)
    }

    async fn request_open(&self) -> Result<(), SurfaceError> {
        self.open_requests.fetch_add(1, Ordering::AcqRel);
        let pending = lock(&self.pending).take();
        if let Some((kind, surface)) = pending {
            self.add(kind, surface);
        }
        Ok(())
    }
}
