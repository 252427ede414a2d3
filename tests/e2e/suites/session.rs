//! 单飞管理员会话

use std::time::Duration;

use crm_shared::models::NotificationChannel;
use notification_service::{EventContext, NotificationEvent};
use serde_json::json;
use tokio::task::JoinSet;

use crate::helpers::{AUTH_PATH, TestEnvironment, order_json};

#[tokio::test]
async fn test_concurrent_operations_share_one_login() {
    let env = TestEnvironment::start().await;
    // 认证变慢，让所有任务都在认证进行中到达
    env.store.respond_with_delay(
        "POST",
        AUTH_PATH,
        200,
        json!({"token": "e2e-token", "admin": {"id": "a1", "email": "ops@example.com"}}),
        Some(Duration::from_millis(200)),
    );
    env.script_order(order_json("o1", "shipped", "paid"), order_json("o1", "shipped", "paid"));
    env.whatsapp_responds(200, json!({"messageId": "wa-1"}));

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let app = env.app.clone();
        tasks.spawn(async move {
            app.notify_order(
                "o1",
                NotificationEvent::OutForDelivery,
                &EventContext::default(),
                NotificationChannel::WhatsApp,
            )
            .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        assert!(joined.unwrap().unwrap().success);
    }

    assert_eq!(env.auth_calls(), 1);
    assert_eq!(env.gateway.count("/whatsapp-api/send-message"), 8);
}

#[tokio::test]
async fn test_missing_credentials_never_reach_the_store() {
    let env = TestEnvironment::start_with(|config| config.pocketbase.admin_password.clear()).await;

    let result = env.app.orders().get("o1").await;

    assert!(result.is_err());
    assert_eq!(env.auth_calls(), 0);
    assert!(env.store.requests().is_empty());
}

#[tokio::test]
async fn test_rejected_login_is_not_retried() {
    let env = TestEnvironment::start().await;
    env.store.respond(
        "POST",
        AUTH_PATH,
        400,
        json!({"message": "Failed to authenticate."}),
    );

    let result = env.app.orders().get("o1").await;

    assert!(result.is_err());
    assert_eq!(env.auth_calls(), 1);
}

#[tokio::test]
async fn test_login_timeouts_are_retried_then_reset() {
    let env = TestEnvironment::start_with(|config| config.pocketbase.auth_timeout_ms = 100).await;
    env.store.respond_with_delay(
        "POST",
        AUTH_PATH,
        200,
        json!({"token": "late", "admin": {"id": "a1", "email": "ops@example.com"}}),
        Some(Duration::from_millis(500)),
    );

    assert!(env.app.orders().get("o1").await.is_err());
    // 首次加两次重试
    assert_eq!(env.auth_calls(), 3);

    // 失败后状态复位，下一次调用重新认证
    assert!(env.app.orders().get("o1").await.is_err());
    assert_eq!(env.auth_calls(), 6);
}
