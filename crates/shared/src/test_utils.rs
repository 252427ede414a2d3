//! 测试工具模块
//!
//! 提供集成测试所需的辅助函数、可编排的 HTTP 模拟网关和测试数据生成器。
//! 模拟网关同时用于 WhatsApp 网关、邮件网关与文档存储的契约测试。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::models::{Order, OrderStatus, PaymentStatus};

// ==================== 测试数据 ====================

/// 生成唯一的测试订单 ID
pub fn test_order_id() -> String {
    format!("ord{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// 构造一个待支付的测试订单
pub fn sample_order(id: &str, customer_name: &str, phone: &str) -> Order {
    Order {
        id: id.to_string(),
        customer_name: customer_name.to_string(),
        customer_email: format!("{}@example.com", customer_name.to_lowercase()),
        customer_phone: phone.to_string(),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        subtotal: 1000.0,
        shipping_cost: 50.0,
        total: 1050.0,
        shipping_address_text: "12 MG Road, Bengaluru".to_string(),
        products: json!([
            {"product_id": "p1", "name": "Cotton Tote", "price": 500.0, "quantity": 2}
        ]),
        created: Some(Utc::now()),
        ..Default::default()
    }
}

// ==================== 模拟 HTTP 网关 ====================

/// 模拟网关收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// 预设的响应
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: Value,
    pub delay: Option<Duration>,
}

#[derive(Default)]
struct MockGatewayState {
    requests: Mutex<Vec<RecordedRequest>>,
    routes: Mutex<HashMap<(String, String), ScriptedResponse>>,
}

/// 可编排的 HTTP 模拟网关
///
/// 按 (方法, 路径) 返回预设响应并记录所有请求，未编排的路径返回 404。
/// drop 时停止后台服务任务。
pub struct MockGateway {
    addr: SocketAddr,
    state: Arc<MockGatewayState>,
    server: tokio::task::JoinHandle<()>,
}

impl MockGateway {
    /// 在随机本地端口上启动
    pub async fn start() -> Self {
        let state = Arc::new(MockGatewayState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("绑定模拟网关端口失败");
        let addr = listener.local_addr().expect("读取模拟网关地址失败");

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// 编排某个路径的响应
    pub fn respond(&self, method: &str, path: &str, status: u16, body: Value) {
        self.respond_with_delay(method, path, status, body, None);
    }

    pub fn respond_with_delay(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: Value,
        delay: Option<Duration>,
    ) {
        self.state.routes.lock().insert(
            (method.to_uppercase(), path.to_string()),
            ScriptedResponse {
                status,
                body,
                delay,
            },
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// 发往指定路径的请求
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(state): State<Arc<MockGatewayState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };

    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect(),
        body,
    });

    let scripted = state
        .routes
        .lock()
        .get(&(method.to_string(), path))
        .cloned();

    match scripted {
        Some(resp) => {
            if let Some(delay) = resp.delay {
                tokio::time::sleep(delay).await;
            }
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(resp.body)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "The requested resource wasn't found."})),
        )
            .into_response(),
    }
}

/// 返回一个没有任何服务监听的地址，用于模拟网关不可达
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("绑定临时端口失败");
    let addr = listener.local_addr().expect("读取临时地址失败");
    drop(listener);
    format!("http://{}", addr)
}
