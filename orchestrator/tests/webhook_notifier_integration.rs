//! Webhook notifier integration
//!
//! Points the notifier at a local mock endpoint and verifies the JSON
//! payload shape, the disabled no-op path and the failure surface.

mod common;

use orchestrator::notify::{Notifier, WebhookNotifier};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_notification_posts_expected_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/patches"))
        .and(body_partial_json(serde_json::json!({
            "recipient": "alice",
            "subject": "Patch schedule rejected: db01 (Q3)",
            "structured": false,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(format!("{}/hooks/patches", server.uri()));
    notifier
        .send(
            "alice",
            "Patch schedule rejected: db01 (Q3)",
            "Rejected by alice. Reason: conflicts with release",
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri());
    let err = notifier.send("ops", "subject", "body", false).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_disabled_notifier_drops_silently() {
    let notifier = WebhookNotifier::new(String::new());
    assert!(!notifier.is_enabled());

    // No endpoint anywhere, yet delivery succeeds as a no-op
    notifier.send("ops", "subject", "body", true).await.unwrap();

    // The startup probe, by contrast, must complain
    assert!(notifier.test_webhook().await.is_err());
}

#[tokio::test]
async fn test_startup_probe_hits_the_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "subject": "Patch orchestrator started",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri());
    notifier.test_webhook().await.unwrap();
}
