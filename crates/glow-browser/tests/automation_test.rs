//! Automation loop tests against scripted surfaces and a mock vision model.

use glow_browser::mock::{MockSurface, MockSurfaceHost};
use glow_browser::{
    AutomationError, AutomationSettings, BrowserAction, BrowserAutomation, RunStatus, SurfaceHandle,
    SurfaceKind, SurfaceRegistry,
};
use glow_providers::mock::{MockProvider, MockResponse};
use glow_providers::ProviderError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn fast_settings() -> AutomationSettings {
    AutomationSettings {
        poll_attempts: 3,
        poll_interval: Duration::from_millis(10),
        settle_delay: Duration::ZERO,
        ..AutomationSettings::default()
    }
}

fn automation(host: MockSurfaceHost, provider: &MockProvider) -> (Arc<SurfaceRegistry>, BrowserAutomation) {
    let registry = Arc::new(SurfaceRegistry::new(Arc::new(host)));
    let automation = BrowserAutomation::new(registry.clone(), Arc::new(provider.clone()))
        .with_settings(fast_settings());
    (registry, automation)
}

fn action(json: serde_json::Value) -> MockResponse {
    MockResponse::text(&format!("```json\n{}\n```", json))
}

#[tokio::test]
async fn test_no_surface_fails_without_actions() {
    let main = Arc::new(MockSurface::new(1, "http://localhost:4100/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Main, main);
    let provider = MockProvider::new().with_vision(true);
    let (registry, automation) = automation(host, &provider);

    let result = automation.run("find lunch near Gangnam", None).await;

    assert!(!result.success);
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.steps, 0);
    assert!(result.actions.is_empty());
    assert_eq!(
        result.final_message,
        "No browser surface is available. Open a browser view manually and try again."
    );
    assert_eq!(provider.request_count(), 0);
    assert!(!registry.is_busy());
}

#[tokio::test]
async fn test_search_extract_then_answer() {
    let page = Arc::new(
        MockSurface::new(7, "https://maps.example.com/")
            .with_text("Results for lunch near Gangnam")
            .with_records(vec![json!({"title": "Mingles", "url": null, "snippet": "Korean fine dining"})]),
    );
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page.clone());
    let provider = MockProvider::new().with_vision(true).with_responses(vec![
        action(json!({"action": "type", "text": "lunch near Gangnam", "reason": "search for places"})),
        action(json!({"action": "extract", "reason": "read the results"})),
        action(json!({"action": "done", "reason": "Mingles is a good lunch spot near Gangnam."})),
    ]);
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(7));

    let result = automation.run("find lunch near Gangnam", None).await;

    assert!(result.success);
    assert_eq!(result.status, RunStatus::Done);
    assert_eq!(result.steps, 3);
    assert_eq!(result.final_message, "Mingles is a good lunch spot near Gangnam.");
    assert_eq!(result.actions.len(), 3);
    assert!(result.actions[1].result.contains("Mingles"));
    assert_eq!(result.last_url.as_deref(), Some("https://maps.example.com/"));
    assert!(result
        .last_screenshot
        .as_deref()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    // The search text is typed and submitted.
    let type_script = page
        .scripts()
        .into_iter()
        .find(|s| s.starts_with("// glow:type"))
        .unwrap();
    assert!(type_script.contains("if (true)"));
    assert!(page.script_kinds().contains(&"extract".to_string()));

    // Every proposal carries the screenshot.
    let requests = provider.get_requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.messages[1].images.len() == 1));
    assert!(requests[2].messages[1].content.contains("extract results"));
}

#[tokio::test]
async fn test_placeholder_done_is_rejected() {
    let page = Arc::new(MockSurface::new(3, "https://search.example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page);
    let provider = MockProvider::new().with_responses(vec![
        action(json!({"action": "done", "reason": "Search completed."})),
        action(json!({"action": "extract"})),
        action(json!({"action": "done", "reason": "The cheapest flight is $212 on Tuesday."})),
    ]);
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(3));

    let result = automation.run("cheapest flight", None).await;

    assert_eq!(result.status, RunStatus::Done);
    assert_eq!(result.steps, 3);
    assert!(result.actions[0].result.starts_with("Rejected"));
    assert_eq!(result.final_message, "The cheapest flight is $212 on Tuesday.");
}

#[tokio::test]
async fn test_step_limit() {
    let page = Arc::new(MockSurface::new(3, "https://news.example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page.clone());
    let provider = MockProvider::new()
        .with_default_response(action(json!({"action": "scroll", "direction": "down"})));
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(3));

    let result = automation.run("read everything", Some(2)).await;

    assert!(!result.success);
    assert_eq!(result.status, RunStatus::MaxSteps);
    assert_eq!(result.steps, 2);
    assert_eq!(provider.request_count(), 2);
    assert!(page.scripts().iter().any(|s| s.contains("window.scrollBy(0, 600)")));
}

#[tokio::test]
async fn test_invalid_action_fails_the_run() {
    let page = Arc::new(MockSurface::new(3, "https://example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page.clone());
    let provider = MockProvider::new().with_responses(vec![action(
        json!({"action": "navigate", "url": "javascript:alert(1)"}),
    )]);
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(3));

    let result = automation.run("go somewhere", None).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.final_message.contains("invalid action"));
    assert!(result.actions.is_empty());
    assert!(page.navigations().is_empty());
}

#[tokio::test]
async fn test_auto_discovery_prefers_external_page() {
    let main = Arc::new(MockSurface::new(1, "http://localhost:4100/"));
    let blank = Arc::new(MockSurface::new(2, "about:blank"));
    let external = Arc::new(MockSurface::new(3, "https://shop.example.com/"));
    let host = MockSurfaceHost::new()
        .with_surface(SurfaceKind::Main, main.clone())
        .with_surface(SurfaceKind::Window, blank.clone())
        .with_surface(SurfaceKind::Window, external.clone());
    let provider = MockProvider::new().with_responses(vec![
        action(json!({"action": "navigate", "url": "https://shop.example.com/deals"})),
        action(json!({"action": "done", "reason": "Deals page shows 3 discounted laptops."})),
    ]);
    let (_registry, automation) = automation(host, &provider);

    let result = automation.run("check deals", None).await;

    assert_eq!(result.status, RunStatus::Done);
    assert_eq!(external.navigations(), vec!["https://shop.example.com/deals"]);
    assert!(main.scripts().is_empty());
    assert!(blank.scripts().is_empty());
}

#[tokio::test]
async fn test_requests_a_surface_and_polls_for_it() {
    let opened = Arc::new(MockSurface::new(9, "about:blank"));
    let host = Arc::new(MockSurfaceHost::new().with_pending(SurfaceKind::Window, opened.clone()));
    let registry = Arc::new(SurfaceRegistry::new(host.clone()));
    let provider = MockProvider::new().with_responses(vec![action(
        json!({"action": "done", "reason": "The page is blank, nothing to report."}),
    )]);
    let automation = BrowserAutomation::new(registry, Arc::new(provider)).with_settings(fast_settings());

    let result = automation.run("look", None).await;

    assert_eq!(host.open_requests(), 1);
    assert_eq!(result.status, RunStatus::Done);
    assert!(!opened.script_kinds().is_empty());
}

#[tokio::test]
async fn test_closed_registered_surface_is_cleared() {
    let page = Arc::new(MockSurface::new(5, "https://example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page.clone());
    let provider = MockProvider::new();
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(5));
    page.close();

    let result = automation.run("anything", None).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(registry.current(), None);
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_second_run_is_busy() {
    let page = Arc::new(MockSurface::new(3, "https://example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page);
    let provider = MockProvider::new()
        .with_delay(Duration::from_millis(300))
        .with_default_response(action(json!({"action": "done", "reason": "Example Domain is the title."})));
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(3));
    let automation = Arc::new(automation);

    let first = {
        let automation = automation.clone();
        tokio::spawn(async move { automation.run("first", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = automation.execute("second", None).await;
    assert!(matches!(second, Err(AutomationError::Busy)));

    let first = first.await.unwrap();
    assert_eq!(first.status, RunStatus::Done);
    assert!(!registry.is_busy());
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_click_falls_back_to_text() {
    let page = Arc::new(MockSurface::new(3, "https://example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page.clone());
    let provider = MockProvider::new().with_responses(vec![
        action(json!({"action": "click", "text": "More information"})),
        action(json!({"action": "done", "reason": "IANA manages example domains."})),
    ]);
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(3));

    let result = automation.run("learn more", None).await;

    assert!(matches!(result.actions[0].action, BrowserAction::Click { .. }));
    assert!(page.script_kinds().contains(&"click_text".to_string()));
    assert!(!page.script_kinds().contains(&"click".to_string()));
}

#[tokio::test]
async fn test_provider_error_mid_run_keeps_final_screenshot() {
    let page = Arc::new(MockSurface::new(3, "https://news.example.com/"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page);
    let provider = MockProvider::new().with_responses(vec![
        action(json!({"action": "scroll", "direction": "down"})),
        MockResponse::error(ProviderError::Transport {
            provider: "mock".to_string(),
            message: "connection reset".to_string(),
        }),
    ]);
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(3));

    let result = automation.run("read the headlines", None).await;

    assert!(!result.success);
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.steps, 1);
    assert_eq!(result.actions.len(), 1);
    assert!(result.final_message.contains("connection reset"));
    assert!(result.last_screenshot.is_some());
    assert!(!registry.is_busy());
}

#[tokio::test]
async fn test_surface_closed_after_first_step() {
    let page = Arc::new(MockSurface::new(3, "https://news.example.com/").closing_after("scroll"));
    let host = MockSurfaceHost::new().with_surface(SurfaceKind::Window, page.clone());
    let provider = MockProvider::new()
        .with_default_response(action(json!({"action": "scroll", "direction": "down"})));
    let (registry, automation) = automation(host, &provider);
    registry.register(SurfaceHandle(3));

    let result = automation.run("read the headlines", None).await;

    assert!(page.is_closed());
    assert!(!result.success);
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.steps, 1);
    assert_eq!(result.actions.len(), 1);
    assert_eq!(result.last_url.as_deref(), Some("https://news.example.com/"));
    assert!(result.last_screenshot.is_some());
    assert_eq!(provider.request_count(), 1);
}
