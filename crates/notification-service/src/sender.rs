//! 渠道发送的公共部分
//!
//! `SendResult` 是所有发送器的统一返回值；`GatewayHttp` 封装对消息网关的
//! JSON POST、超时与错误响应解析，供 WhatsApp 与邮件客户端共用。

use std::time::{Duration, Instant};

use chrono::Utc;
use crm_shared::config::GatewayConfig;
use crm_shared::error::CrmError;
use crm_shared::observability::metrics::record_gateway_request;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::NotificationError;
use crate::status::{ConnectionStatus, check_gateway_status};

/// 网关返回 500 且没有说明时的图片发送提示
pub const IMAGE_FETCH_HINT: &str =
    "WhatsApp API server error. The image URL may not be accessible to the API.";

/// 发送结果
///
/// 预期内的失败（网关错误、超时、参数不合法）都以 `success: false` 返回，
/// message 始终非空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl SendResult {
    /// 由网关成功响应构造；messageId 缺失时取 id，status 缺省 "sent"，timestamp 缺省当前时间
    pub fn delivered(message: impl Into<String>, response: &Value) -> Self {
        let field = |key: &str| match response.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            success: true,
            message: message.into(),
            message_id: field("messageId").or_else(|| field("id")),
            status: Some(field("status").unwrap_or_else(|| "sent".to_string())),
            timestamp: Some(field("timestamp").unwrap_or_else(|| Utc::now().to_rfc3339())),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            message: if message.trim().is_empty() {
                "Unknown error occurred".to_string()
            } else {
                message
            },
            message_id: None,
            status: None,
            timestamp: None,
        }
    }
}

/// 发送类型，决定网关端点与结果文案
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Document,
    Email,
    EmailWithAttachment,
}

impl MessageKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Text => "/send-message",
            Self::Image => "/send-image-url",
            Self::Video => "/send-video-url",
            Self::Document => "/send-document-url",
            Self::Email => "/send-email",
            Self::EmailWithAttachment => "/send-email-with-attachment",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::Text => "Message sent",
            Self::Image => "Image message sent",
            Self::Video => "Video message sent",
            Self::Document => "Document message sent",
            Self::Email => "Email sent",
            Self::EmailWithAttachment => "Email with attachment sent",
        }
    }

    pub fn default_failure(&self) -> &'static str {
        match self {
            Self::Text => "Failed to send WhatsApp message",
            Self::Image => "Failed to send WhatsApp image message",
            Self::Video => "Failed to send WhatsApp video message",
            Self::Document => "Failed to send WhatsApp document message",
            Self::Email => "Failed to send email",
            Self::EmailWithAttachment => "Failed to send email with attachment",
        }
    }

    /// 失败文案：响应体 message，其次 error，图片 500 时给出固定提示，最后是渠道默认文案
    ///
    /// 文案面向用户，内部错误的中文描述不外露，传输失败只附带底层错误文本。
    pub fn failure_message(&self, err: &NotificationError) -> String {
        match err {
            NotificationError::Gateway {
                detail: Some(detail),
                ..
            } => detail.clone(),
            NotificationError::Gateway { status: 500, .. } if *self == Self::Image => {
                IMAGE_FETCH_HINT.to_string()
            }
            NotificationError::Gateway { .. } => self.default_failure().to_string(),
            NotificationError::Validation(message) => message.clone(),
            NotificationError::Transport { reason, .. } => {
                format!("{}: {reason}", self.default_failure())
            }
            NotificationError::Timeout { .. } => {
                format!("{}: request timed out", self.default_failure())
            }
            NotificationError::Media(_) | NotificationError::Shared(_) => {
                self.default_failure().to_string()
            }
        }
    }
}

/// 消息网关的 HTTP 访问
#[derive(Clone)]
pub struct GatewayHttp {
    http: reqwest::Client,
    base_url: String,
    /// 指标与日志中使用的网关标识
    name: &'static str,
    /// 面向用户的网关名称
    label: &'static str,
    status_timeout: Duration,
}

impl GatewayHttp {
    pub fn new(
        name: &'static str,
        label: &'static str,
        config: &GatewayConfig,
    ) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CrmError::Internal(format!("HTTP 客户端构建失败: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            name,
            label,
            status_timeout: config.status_timeout(),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// POST JSON 并返回响应体；非 2xx 响应转换为 `NotificationError::Gateway`
    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, NotificationError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let started = Instant::now();

        let result = self.http.post(&url).json(body).send().await;
        record_gateway_request(self.name, endpoint, started.elapsed().as_secs_f64());

        let response = result.map_err(|e| NotificationError::from_reqwest(self.name, e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| NotificationError::from_reqwest(self.name, e))?;
        let payload: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        debug!(gateway = self.name, endpoint, status = status.as_u16(), "网关已响应");

        if status.is_success() {
            return Ok(payload);
        }

        let detail = ["message", "error"].iter().find_map(|key| {
            payload
                .get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        Err(NotificationError::Gateway {
            gateway: self.name.to_string(),
            status: status.as_u16(),
            detail,
        })
    }

    pub async fn check_status(&self) -> ConnectionStatus {
        check_gateway_status(
            &self.http,
            &self.base_url,
            self.name,
            self.label,
            self.status_timeout,
        )
        .await
    }
}
