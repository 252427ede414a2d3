//! 测试环境
//!
//! 一个模拟文档存储加一个模拟消息网关，WhatsApp 与邮件网关共用后者，
//! 分别挂在 `/whatsapp-api` 与 `/api/email` 前缀下。

use std::sync::Arc;

use crm_shared::config::AppConfig;
use crm_shared::test_utils::MockGateway;
use notification_service::app::App;
use serde_json::{Value, json};

pub const AUTH_PATH: &str = "/api/admins/auth-with-password";

/// 指向给定模拟服务的配置，重试与超时都调短
pub fn test_config(store_url: &str, gateway_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.service_name = "crm-notify-e2e".to_string();

    config.pocketbase.url = store_url.to_string();
    config.pocketbase.admin_email = "ops@example.com".to_string();
    config.pocketbase.admin_password = "e2e-secret".to_string();
    config.pocketbase.auth_timeout_ms = 2_000;
    config.pocketbase.max_auth_retries = 2;
    config.pocketbase.auth_retry_step_ms = 10;
    config.pocketbase.request_timeout_seconds = 5;

    config.whatsapp.base_url = format!("{gateway_url}/whatsapp-api");
    config.whatsapp.request_timeout_seconds = 5;
    config.whatsapp.status_timeout_seconds = 2;
    config.email.base_url = format!("{gateway_url}/api/email");
    config.email.request_timeout_seconds = 5;
    config.email.status_timeout_seconds = 2;

    config.notification.storefront_url = "https://shop.example".to_string();
    config.notification.activity_log_timeout_ms = 2_000;
    config
}

/// 文档存储中的订单记录
pub fn order_json(id: &str, status: &str, payment_status: &str) -> Value {
    json!({
        "id": id,
        "customer_name": "Asha",
        "customer_email": "asha@example.com",
        "customer_phone": "98765 43210",
        "status": status,
        "payment_status": payment_status,
        "subtotal": 1000.0,
        "shipping_cost": 50.0,
        "total": 1050.0,
        "products": "[{\"product_id\":\"p1\",\"name\":\"Cotton Tote\",\"price\":500,\"quantity\":2}]",
        "created": "2024-05-01 10:20:30.123Z",
    })
}

pub struct TestEnvironment {
    pub store: MockGateway,
    pub gateway: MockGateway,
    pub app: Arc<App>,
}

impl TestEnvironment {
    /// 启动两个模拟服务，管理员认证与活动记录写入默认成功
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// 启动前允许调整配置
    pub async fn start_with(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let store = MockGateway::start().await;
        let gateway = MockGateway::start().await;

        store.respond(
            "POST",
            AUTH_PATH,
            200,
            json!({"token": "e2e-token", "admin": {"id": "a1", "email": "ops@example.com"}}),
        );
        for collection in ["whatsapp_activities", "email_activities"] {
            store.respond(
                "POST",
                &format!("/api/collections/{collection}/records"),
                200,
                json!({"id": format!("{collection}-1"), "recipient": "", "status": "sent", "timestamp": "2024-05-01 10:20:30.123Z"}),
            );
        }

        let mut config = test_config(&store.base_url(), &gateway.base_url());
        adjust(&mut config);
        let app = Arc::new(App::from_config(config).expect("装配测试应用失败"));

        Self {
            store,
            gateway,
            app,
        }
    }

    /// 编排订单读取与更新的响应
    pub fn script_order(&self, before: Value, after: Value) {
        let path = format!(
            "/api/collections/orders/records/{}",
            before["id"].as_str().unwrap_or_default()
        );
        self.store.respond("GET", &path, 200, before);
        self.store.respond("PATCH", &path, 200, after);
    }

    pub fn whatsapp_responds(&self, status: u16, body: Value) {
        self.gateway
            .respond("POST", "/whatsapp-api/send-message", status, body);
    }

    /// 写入 WhatsApp 活动集合的请求体
    pub fn logged_whatsapp_activities(&self) -> Vec<Value> {
        self.store
            .requests_to("/api/collections/whatsapp_activities/records")
            .into_iter()
            .filter(|r| r.method == "POST")
            .map(|r| r.body)
            .collect()
    }

    pub fn auth_calls(&self) -> usize {
        self.store.count(AUTH_PATH)
    }
}
