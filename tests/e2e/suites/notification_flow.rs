//! 订单业务通知全链路
//!
//! 订单读写与活动记录走模拟文档存储，消息发送走模拟网关。

use crm_shared::models::{NewOrder, NotificationChannel, OrderItem, OrderStatus, PaymentStatus};
use notification_service::{EventContext, NotificationEvent};
use serde_json::{Value, json};

use crate::helpers::{TestEnvironment, order_json};

#[tokio::test]
async fn test_ship_order_notifies_customer_and_logs_activity() {
    let env = TestEnvironment::start().await;
    let mut shipped = order_json("o1", "shipped", "paid");
    shipped["tracking_code"] = json!("TRK1");
    shipped["tracking_url"] = json!("https://track.example/TRK1");
    env.script_order(order_json("o1", "processing", "paid"), shipped);
    env.whatsapp_responds(200, json!({"success": true, "messageId": "wa-1"}));

    let outcome = env
        .app
        .ship_order("o1", "TRK1", "https://track.example/TRK1", Some("BlueDart".to_string()))
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Shipped);
    let result = outcome.notification.expect("发货应触发通知");
    assert!(result.success);
    assert_eq!(result.message_id.as_deref(), Some("wa-1"));

    // 订单更新携带物流信息
    let patch = env
        .store
        .requests_to("/api/collections/orders/records/o1")
        .into_iter()
        .find(|r| r.method == "PATCH")
        .unwrap();
    assert_eq!(patch.body["tracking_code"], "TRK1");
    assert_eq!(patch.body["status"], "shipped");

    let sent = &env.gateway.requests_to("/whatsapp-api/send-message")[0];
    assert_eq!(sent.body["number"], "919876543210");
    assert_eq!(
        sent.body["variables"],
        json!({"1": "Asha", "2": "o1", "3": "https://track.example/TRK1", "4": "BlueDart"})
    );
    assert!(sent.body["message"].as_str().unwrap().contains("is on its way"));

    let logged = env.logged_whatsapp_activities();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0]["order_id"], "o1");
    assert_eq!(logged[0]["template_name"], "order_shipped");
    assert_eq!(logged[0]["status"], "sent");
    assert_eq!(logged[0]["recipient"], "919876543210");

    // 认证一次，之后的请求都带同一个令牌
    assert_eq!(env.auth_calls(), 1);
    assert!(
        env.store
            .requests()
            .iter()
            .filter(|r| r.path.starts_with("/api/collections/"))
            .all(|r| r.headers.get("authorization").map(String::as_str) == Some("Bearer e2e-token"))
    );
}

#[tokio::test]
async fn test_payment_failure_is_logged_with_gateway_result() {
    let env = TestEnvironment::start().await;
    env.script_order(order_json("X1", "pending", "pending"), order_json("X1", "pending", "failed"));
    env.whatsapp_responds(500, json!({"message": "Number not registered"}));

    let ctx = EventContext::with_link("https://pay/x1");
    let outcome = env
        .app
        .update_payment("X1", PaymentStatus::Failed, &ctx)
        .await
        .unwrap();

    let result = outcome.notification.unwrap();
    assert!(!result.success);
    assert_eq!(result.message, "Number not registered");

    let sent = &env.gateway.requests_to("/whatsapp-api/send-message")[0];
    assert_eq!(sent.body["variables"], json!({"1": "Asha", "2": "X1", "3": "https://pay/x1"}));

    let logged = env.logged_whatsapp_activities();
    assert_eq!(logged[0]["template_name"], "payment_failed");
    assert_eq!(logged[0]["status"], "failed");
    assert_eq!(logged[0]["error_message"], "Number not registered");
    let content: Value = serde_json::from_str(logged[0]["message_content"].as_str().unwrap()).unwrap();
    assert_eq!(content["response"]["success"], false);
}

#[tokio::test]
async fn test_activity_store_outage_does_not_change_result() {
    let env = TestEnvironment::start().await;
    env.store.respond(
        "POST",
        "/api/collections/whatsapp_activities/records",
        500,
        json!({"message": "Something went wrong."}),
    );
    env.script_order(order_json("o1", "delivered", "paid"), order_json("o1", "delivered", "paid"));
    env.whatsapp_responds(200, json!({"messageId": "wa-9"}));

    let result = env
        .app
        .notify_order(
            "o1",
            NotificationEvent::OrderDelivered,
            &EventContext::default(),
            NotificationChannel::WhatsApp,
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.message_id.as_deref(), Some("wa-9"));
    assert_eq!(env.logged_whatsapp_activities().len(), 1);
}

#[tokio::test]
async fn test_email_notification_is_logged_with_subject() {
    let env = TestEnvironment::start().await;
    env.script_order(order_json("o1", "processing", "paid"), order_json("o1", "processing", "paid"));
    env.gateway.respond(
        "POST",
        "/api/email/send-email",
        200,
        json!({"success": true, "messageId": "em-1"}),
    );

    let result = env
        .app
        .notify_order(
            "o1",
            NotificationEvent::OrderConfirmation,
            &EventContext::default(),
            NotificationChannel::Email,
        )
        .await
        .unwrap();

    assert!(result.success);
    let sent = &env.gateway.requests_to("/api/email/send-email")[0];
    assert_eq!(sent.body["to"], "asha@example.com");
    assert_eq!(sent.body["subject"], "Konipai: Order #o1 confirmed");
    assert!(sent.body["message"].as_str().unwrap().contains("Total: ₹1000"));

    let logged: Vec<Value> = env
        .store
        .requests_to("/api/collections/email_activities/records")
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0]["subject"], "Konipai: Order #o1 confirmed");
    assert_eq!(logged[0]["recipient"], "asha@example.com");
}

#[tokio::test]
async fn test_unmapped_transition_sends_nothing() {
    let env = TestEnvironment::start().await;
    env.script_order(order_json("o1", "processing", "paid"), order_json("o1", "cancelled", "paid"));

    let outcome = env
        .app
        .transition_order("o1", OrderStatus::Cancelled, &EventContext::default())
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Cancelled);
    assert!(outcome.notification.is_none());
    assert!(env.gateway.requests().is_empty());
    assert!(env.logged_whatsapp_activities().is_empty());
}

#[tokio::test]
async fn test_missing_order_is_an_error() {
    let env = TestEnvironment::start().await;

    let result = env
        .app
        .notify_order(
            "missing",
            NotificationEvent::RequestReview,
            &EventContext::default(),
            NotificationChannel::WhatsApp,
        )
        .await;

    assert!(result.is_err());
    assert!(env.gateway.requests().is_empty());
}

#[tokio::test]
async fn test_create_order_sends_confirmation_to_posted_number() {
    let env = TestEnvironment::start().await;
    let mut created = order_json("o7", "pending", "pending");
    created["customer_phone"] = json!("1234-5678");
    env.store
        .respond("POST", "/api/collections/orders/records", 200, created);
    env.whatsapp_responds(200, json!({"messageId": "wa-7"}));

    let new_order = NewOrder {
        customer_name: "Asha".to_string(),
        customer_email: "asha@example.com".to_string(),
        customer_phone: "1234-5678".to_string(),
        items: vec![OrderItem {
            product_id: Some("p1".to_string()),
            name: "Cotton Tote".to_string(),
            price: 500.0,
            quantity: 2,
            total: None,
        }],
        shipping_cost: 50.0,
        ..Default::default()
    };
    let outcome = env.app.create_order(&new_order, true).await.unwrap();

    assert_eq!(outcome.order.id, "o7");
    assert!(outcome.notification.is_some_and(|r| r.success));

    let posted = &env.store.requests_to("/api/collections/orders/records")[0];
    assert_eq!(posted.body["subtotal"], 1000.0);
    assert_eq!(posted.body["total"], 1050.0);

    // 审计记录与实际发送的号码一致
    let sent = &env.gateway.requests_to("/whatsapp-api/send-message")[0];
    let logged = env.logged_whatsapp_activities();
    assert_eq!(sent.body["number"], "9112345678");
    assert_eq!(logged[0]["recipient"], sent.body["number"]);
    assert_eq!(logged[0]["template_name"], "order_confirmation");
}

#[tokio::test]
async fn test_create_order_without_notify_sends_nothing() {
    let env = TestEnvironment::start().await;
    env.store.respond(
        "POST",
        "/api/collections/orders/records",
        200,
        order_json("o8", "pending", "pending"),
    );

    let new_order = NewOrder {
        customer_name: "Asha".to_string(),
        customer_email: "asha@example.com".to_string(),
        ..Default::default()
    };
    let outcome = env.app.create_order(&new_order, false).await.unwrap();

    assert!(outcome.notification.is_none());
    assert_eq!(env.gateway.count("/whatsapp-api/send-message"), 0);
}
