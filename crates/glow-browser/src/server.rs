//! Loopback HTTP control endpoint.

use anyhow::{bail, Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use glow_providers::ImageContent;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::automation::{AgentRunResult, BrowserAutomation};
use crate::error::{AutomationError, SurfaceError};
use crate::surface::SurfaceHandle;

pub type ServerState = Arc<BrowserAutomation>;

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SurfaceError> for ApiError {
    fn from(e: SurfaceError) -> Self {
        let status = if e.is_lost() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_GATEWAY
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))
}

#[derive(Debug)]
struct TaskRequest {
    task: String,
    max_steps: Option<usize>,
}

impl TaskRequest {
    fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = parse_body(body)?;
        let task = value
            .get("task")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::bad_request("\"task\" must be a non-empty string"))?
            .to_string();
        let max_steps = match value.get("maxSteps") {
            None | Some(Value::Null) => None,
            Some(steps) => Some(
                steps
                    .as_u64()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ApiError::bad_request("\"maxSteps\" must be a positive integer"))?
                    as usize,
            ),
        };
        Ok(Self { task, max_steps })
    }
}

async fn run_task(State(automation): State<ServerState>, body: Bytes) -> Response {
    let request = match TaskRequest::from_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    info!("endpoint task: {}", request.task);

    match automation.execute(&request.task, request.max_steps).await {
        Ok(result) => Json(result).into_response(),
        Err(AutomationError::Busy) => {
            warn!("rejected task, another run is in progress");
            ApiError {
                status: StatusCode::CONFLICT,
                message: AutomationError::Busy.to_string(),
            }
            .into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(AgentRunResult::rejected(&e))).into_response(),
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    handle: u64,
}

async fn register_surface(State(automation): State<ServerState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: RegisterRequest = parse_body(&body)?;
    automation.registry().register(SurfaceHandle(request.handle));
    Ok(Json(json!({ "handle": request.handle })))
}

async fn unregister_surface(State(automation): State<ServerState>) -> Json<Value> {
    automation.registry().unregister();
    Json(json!({ "handle": Value::Null }))
}

async fn surface_url(State(automation): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let url = automation.registry().current_url().await?;
    Ok(Json(json!({ "url": url })))
}

#[derive(Deserialize)]
struct NavigateRequest {
    url: String,
}

async fn surface_navigate(State(automation): State<ServerState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: NavigateRequest = parse_body(&body)?;
    automation.registry().navigate(&request.url).await?;
    Ok(Json(json!({ "url": request.url })))
}

#[derive(Deserialize)]
struct ScriptRequest {
    script: String,
}

async fn surface_script(State(automation): State<ServerState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: ScriptRequest = parse_body(&body)?;
    let result = automation.registry().execute_script(&request.script).await?;
    Ok(Json(json!({ "result": result })))
}

async fn surface_screenshot(State(automation): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let bytes = automation.registry().screenshot().await?;
    Ok(Json(json!({
        "screenshot": ImageContent::from_bytes(&bytes).to_data_uri()
    })))
}

#[derive(Deserialize)]
struct ElementsQuery {
    max: Option<usize>,
}

async fn surface_elements(
    State(automation): State<ServerState>,
    Query(query): Query<ElementsQuery>,
) -> Result<Json<Value>, ApiError> {
    let max = query.max.unwrap_or(automation.settings().max_elements);
    let elements = automation.registry().list_interactive_elements(max).await?;
    Ok(Json(json!({ "elements": elements })))
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", post(run_task))
        .route("/agent", post(run_task))
        .route("/surface/register", post(register_surface))
        .route("/surface/unregister", post(unregister_surface))
        .route("/surface/url", get(surface_url))
        .route("/surface/navigate", post(surface_navigate))
        .route("/surface/script", post(surface_script))
        .route("/surface/screenshot", get(surface_screenshot))
        .route("/surface/elements", get(surface_elements))
        .with_state(state)
}

fn loopback_ip(host: &str) -> Result<IpAddr> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    let ip: IpAddr = host
        .trim_matches(['[', ']'])
        .parse()
        .with_context(|| format!("Invalid server host '{}'", host))?;
    if !ip.is_loopback() {
        bail!("Refusing to bind the control endpoint to non-loopback address {}", ip);
    }
    Ok(ip)
}

/// Bind a listener on a loopback address. Port 0 picks a free port.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::new(loopback_ip(host)?, port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind control endpoint on {}", addr))?;
    debug!("control endpoint bound to {}", addr);
    Ok(listener)
}

pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    info!("control endpoint listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .await
        .context("Control endpoint stopped")
}
