//! Loopback endpoint tests over a real socket.

use glow_browser::mock::{MockSurface, MockSurfaceHost};
use glow_browser::{server, AutomationSettings, BrowserAutomation, SurfaceKind, SurfaceRegistry};
use glow_providers::mock::{MockProvider, MockResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn start(host: MockSurfaceHost, provider: MockProvider) -> String {
    let registry = Arc::new(SurfaceRegistry::new(Arc::new(host)));
    let automation = BrowserAutomation::new(registry, Arc::new(provider)).with_settings(AutomationSettings {
        poll_attempts: 2,
        poll_interval: Duration::from_millis(10),
        settle_delay: Duration::ZERO,
        ..AutomationSettings::default()
    });
    let listener = server::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, Arc::new(automation)));
    format!("http://{}", addr)
}

fn done(reason: &str) -> MockResponse {
    MockResponse::text(&json!({"action": "done", "reason": reason}).to_string())
}

#[tokio::test]
async fn test_post_runs_a_task() {
    let page = Arc::new(MockSurface::new(4, "https://example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page);
    let base = start(host, MockProvider::new().with_response(done("Example Domain is for documentation."))).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/surface/register", base))
        .body(r#"{"handle":4}"#)
        .send()
        .await
        .unwrap();
    let response = client
        .post(format!("{}/agent", base))
        .body(r#"{"task":"what is this page","maxSteps":3}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "done");
    assert_eq!(body["steps"], 1);
    assert_eq!(body["finalMessage"], "Example Domain is for documentation.");
    assert_eq!(body["lastUrl"], "https://example.com/");
    assert_eq!(body["actions"][0]["action"]["action"], "done");
}

#[tokio::test]
async fn test_bad_requests() {
    let base = start(MockSurfaceHost::new(), MockProvider::new()).await;
    let client = reqwest::Client::new();

    for body in ["{}", r#"{"task":""}"#, "not json", r#"{"task":"x","maxSteps":-1}"#] {
        let response = client.post(&base).body(body).send().await.unwrap();
        assert_eq!(response.status(), 400, "body {}", body);
    }

    let response = client.get(&base).send().await.unwrap();
    assert_eq!(response.status(), 405);
    let response = client.put(format!("{}/agent", base)).send().await.unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_unresolvable_surface_is_400() {
    let base = start(MockSurfaceHost::new(), MockProvider::new()).await;

    let response = reqwest::Client::new()
        .post(&base)
        .body(r#"{"task":"find lunch"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "failed");
    assert!(body["finalMessage"].as_str().unwrap().contains("Open a browser view manually"));
}

#[tokio::test]
async fn test_concurrent_task_is_409() {
    let page = Arc::new(MockSurface::new(4, "https://example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page);
    let provider = MockProvider::new()
        .with_delay(Duration::from_millis(400))
        .with_default_response(done("Example Domain is for documentation."));
    let base = start(host, provider).await;
    let client = reqwest::Client::new();
    client
        .post(format!("{}/surface/register", base))
        .body(r#"{"handle":4}"#)
        .send()
        .await
        .unwrap();

    let first = {
        let client = client.clone();
        let base = base.clone();
        tokio::spawn(async move { client.post(&base).body(r#"{"task":"one"}"#).send().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = client.post(&base).body(r#"{"task":"two"}"#).send().await.unwrap();

    assert_eq!(second.status(), 409);
    assert_eq!(first.await.unwrap().unwrap().status(), 200);
}

#[tokio::test]
async fn test_surface_control_routes() {
    let page = Arc::new(MockSurface::new(2, "https://example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page.clone());
    let base = start(host, MockProvider::new()).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/surface/url", base)).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "no surface registered");

    client
        .post(format!("{}/surface/register", base))
        .body(r#"{"handle":2}"#)
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/surface/navigate", base))
        .body(r#"{"url":"https://example.org/"}"#)
        .send()
        .await
        .unwrap();
    let body: Value = client
        .get(format!("{}/surface/url", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["url"], "https://example.org/");
    assert_eq!(page.navigations(), vec!["https://example.org/"]);

    let body: Value = client
        .get(format!("{}/surface/screenshot", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["screenshot"].as_str().unwrap().starts_with("data:image/png;base64,"));

    client.post(format!("{}/surface/unregister", base)).send().await.unwrap();
    let response = client.get(format!("{}/surface/elements", base)).send().await.unwrap();
    assert_eq!(response.status(), 404);
}
