//! Surfaces backed by the windows of a WebDriver session.
//!
//! Each browser window or tab is one surface. The window that exists when the
//! session starts is reported as the main window. Frames are not enumerated,
//! so this host never reports a `ContentFrame`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SurfaceError;
use crate::surface::{Surface, SurfaceHandle, SurfaceHost, SurfaceInfo, SurfaceKind};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn driver_error(e: CmdError) -> SurfaceError {
    SurfaceError::Driver(e.to_string())
}

/// Numeric handles for WebDriver window ids, plus which window has focus.
#[derive(Default)]
struct WindowTable {
    next_id: u64,
    ids: HashMap<String, SurfaceHandle>,
    windows: HashMap<SurfaceHandle, String>,
    main: Option<String>,
    focused: Option<String>,
}

impl WindowTable {
    fn handle_for(&mut self, window: &str) -> SurfaceHandle {
        if let Some(handle) = self.ids.get(window) {
            return *handle;
        }
        self.next_id += 1;
        let handle = SurfaceHandle(self.next_id);
        self.ids.insert(window.to_string(), handle);
        self.windows.insert(handle, window.to_string());
        handle
    }

    fn drop_window(&mut self, handle: SurfaceHandle) {
        if let Some(window) = self.windows.remove(&handle) {
            self.ids.remove(&window);
            if self.focused.as_deref() == Some(window.as_str()) {
                self.focused = None;
            }
        }
    }
}

struct Session {
    client: Client,
    // Held across switch + command so two surfaces never interleave.
    table: Mutex<WindowTable>,
}

impl Session {
    async fn live_windows(&self) -> Result<Vec<String>, SurfaceError> {
        let windows = self.client.windows().await.map_err(driver_error)?;
        Ok(windows.into_iter().map(String::from).collect())
    }

    /// Switch the session to `handle`, failing with `Gone` if it was closed.
    async fn focus(&self, table: &mut WindowTable, handle: SurfaceHandle) -> Result<(), SurfaceError> {
        let window = table
            .windows
            .get(&handle)
            .cloned()
            .ok_or(SurfaceError::NotFound(handle))?;
        if !self.live_windows().await?.contains(&window) {
            table.drop_window(handle);
            return Err(SurfaceError::Gone(handle));
        }
        if table.focused.as_deref() != Some(window.as_str()) {
            let target = WindowHandle::try_from(window.clone())
                .map_err(|_| SurfaceError::Driver(format!("invalid window handle {}", window)))?;
            self.client.switch_to_window(target).await.map_err(driver_error)?;
            table.focused = Some(window);
        }
        Ok(())
    }
}

/// A WebDriver session exposed as a `SurfaceHost`.
pub struct WebDriverHost {
    session: Arc<Session>,
}

impl WebDriverHost {
    /// Connect to a running WebDriver server (chromedriver, geckodriver...).
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        let mut args = vec![
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=1280,900".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }
        let mut caps = serde_json::Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let mut builder = ClientBuilder::native();
        let client = tokio::time::timeout(CONNECT_TIMEOUT, builder.capabilities(caps).connect(webdriver_url))
            .await
            .with_context(|| format!("Connection to WebDriver at {} timed out", webdriver_url))?
            .with_context(|| format!("Failed to connect to WebDriver at {}", webdriver_url))?;

        let main: String = client.window().await.context("Failed to read the initial window")?.into();
        let mut table = WindowTable::default();
        table.handle_for(&main);
        table.main = Some(main.clone());
        table.focused = Some(main);
        info!("connected to WebDriver at {}", webdriver_url);

        Ok(Self {
            session: Arc::new(Session {
                client,
                table: Mutex::new(table),
            }),
        })
    }

    /// End the WebDriver session. Outstanding surfaces become unusable.
    pub async fn quit(&self) -> Result<()> {
        self.session
            .client
            .clone()
            .close()
            .await
            .context("Failed to close the WebDriver session")
    }
}

#[async_trait]
impl SurfaceHost for WebDriverHost {
    async fn surfaces(&self) -> Result<Vec<SurfaceInfo>, SurfaceError> {
        let mut table = self.session.table.lock().await;
        let live = self.session.live_windows().await?;

        let stale: Vec<SurfaceHandle> = table
            .windows
            .iter()
            .filter(|(_, window)| !live.contains(window))
            .map(|(handle, _)| *handle)
            .collect();
        for handle in stale {
            table.drop_window(handle);
        }

        let mut infos = Vec::with_capacity(live.len());
        for window in &live {
            let handle = table.handle_for(window);
            self.session.focus(&mut table, handle).await?;
            let url = self
                .session
                .client
                .current_url()
                .await
                .map(|u| u.to_string())
                .unwrap_or_default();
            let kind = if table.main.as_deref() == Some(window.as_str()) {
                SurfaceKind::Main
            } else {
                SurfaceKind::Window
            };
            infos.push(SurfaceInfo { handle, kind, url });
        }
        Ok(infos)
    }

    async fn get(&self, handle: SurfaceHandle) -> Option<Arc<dyn Surface>> {
        let mut table = self.session.table.lock().await;
        let window = table.windows.get(&handle).cloned()?;
        match self.session.live_windows().await {
            Ok(live) if live.contains(&window) => Some(Arc::new(WebDriverSurface {
                handle,
                session: self.session.clone(),
            })),
            Ok(_) => {
                table.drop_window(handle);
                None
            }
            Err(e) => {
                debug!("window lookup failed: {}", e);
                None
            }
        }
    }

    async fn request_open(&self) -> Result<(), SurfaceError> {
        let mut table = self.session.table.lock().await;
        let response = self.session.client.new_window(true).await.map_err(driver_error)?;
        let window: String = response.handle.into();
        let handle = table.handle_for(&window);
        info!("opened browser tab {}", handle);
        Ok(())
    }
}

pub struct WebDriverSurface {
    handle: SurfaceHandle,
    session: Arc<Session>,
}

#[async_trait]
impl Surface for WebDriverSurface {
    fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        let mut table = self.session.table.lock().await;
        self.session.focus(&mut table, self.handle).await?;
        let url = self.session.client.current_url().await.map_err(driver_error)?;
        Ok(url.to_string())
    }

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        let mut table = self.session.table.lock().await;
        self.session.focus(&mut table, self.handle).await?;
        self.session.client.goto(url).await.map_err(driver_error)
    }

    async fn execute_script(&self, script: &str) -> Result<Value, SurfaceError> {
        let mut table = self.session.table.lock().await;
        self.session.focus(&mut table, self.handle).await?;
        self.session
            .client
            .execute(script, vec![])
            .await
            .map_err(|e| SurfaceError::Script(e.to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError> {
        let mut table = self.session.table.lock().await;
        self.session.focus(&mut table, self.handle).await?;
        self.session
            .client
            .screenshot()
            .await
            .map_err(|e| SurfaceError::Screenshot(e.to_string()))
    }
}
