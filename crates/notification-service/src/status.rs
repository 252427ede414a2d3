//! 网关连接状态检查
//!
//! 对 `{gateway}/status` 发起一次短超时的 GET。任何失败都返回
//! `connected: false, status: "disconnected"`，message 说明失败类型。

use std::time::{Duration, Instant};

use crm_shared::observability::metrics::record_gateway_request;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub status: String,
    pub message: String,
}

impl ConnectionStatus {
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            status: "disconnected".to_string(),
            message: message.into(),
        }
    }
}

/// 检查网关状态
///
/// `label` 是面向用户的网关名称，例如 "WhatsApp API"。
pub async fn check_gateway_status(
    http: &reqwest::Client,
    base_url: &str,
    gateway: &str,
    label: &str,
    timeout: Duration,
) -> ConnectionStatus {
    let url = format!("{}/status", base_url.trim_end_matches('/'));
    let started = Instant::now();

    let response = http.get(&url).timeout(timeout).send().await;
    record_gateway_request(gateway, "status", started.elapsed().as_secs_f64());

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let message = if e.is_timeout() {
                format!("{label} status check timed out after {}s", timeout.as_secs_f64())
            } else {
                format!("No response received from {label}")
            };
            warn!(gateway, error = %e, "网关状态检查失败");
            return ConnectionStatus::disconnected(message);
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(gateway, status = status.as_u16(), "网关状态检查返回错误");
        return ConnectionStatus::disconnected(format!(
            "{label} error: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ));
    }

    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let field = |key: &str| {
        body.get(key)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    debug!(gateway, "网关已连接");
    ConnectionStatus {
        connected: true,
        status: field("status").unwrap_or_else(|| "connected".to_string()),
        message: field("message").unwrap_or_else(|| format!("{label} is connected")),
    }
}
