//! 网关连接状态检查

use std::time::{Duration, Instant};

use crm_shared::test_utils::unreachable_base_url;
use serde_json::json;

use crate::helpers::TestEnvironment;

#[tokio::test]
async fn test_reports_each_gateway() {
    let env = TestEnvironment::start().await;
    env.gateway.respond(
        "GET",
        "/whatsapp-api/status",
        200,
        json!({"status": "ready", "message": "Client is ready"}),
    );
    env.gateway.respond("GET", "/api/email/status", 503, json!({}));

    let statuses = env.app.gateway_statuses().await;

    assert!(statuses.whatsapp.connected);
    assert_eq!(statuses.whatsapp.status, "ready");
    assert_eq!(statuses.whatsapp.message, "Client is ready");
    assert!(!statuses.email.connected);
    assert_eq!(statuses.email.message, "Email API error: 503 Service Unavailable");
}

#[tokio::test]
async fn test_unreachable_gateway_is_disconnected_within_timeout() {
    let unreachable = unreachable_base_url().await;
    let env = TestEnvironment::start_with(|config| {
        config.whatsapp.base_url = unreachable.clone();
        config.email.base_url = unreachable.clone();
    })
    .await;

    let started = Instant::now();
    let statuses = env.app.gateway_statuses().await;

    assert!(started.elapsed() < Duration::from_secs(3));
    for status in [statuses.whatsapp, statuses.email] {
        assert!(!status.connected);
        assert_eq!(status.status, "disconnected");
    }
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let env = TestEnvironment::start_with(|config| config.whatsapp.status_timeout_seconds = 1).await;
    env.gateway.respond_with_delay(
        "GET",
        "/whatsapp-api/status",
        200,
        json!({"status": "connected"}),
        Some(Duration::from_secs(3)),
    );

    let started = Instant::now();
    let statuses = env.app.gateway_statuses().await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!statuses.whatsapp.connected);
    assert!(statuses.whatsapp.message.contains("timed out"));
}
