//! 通知服务错误类型
//!
//! 渠道层的失败分类。发送器在边界处把它们转换为 `SendResult`，
//! 不会向业务调用方传播。

use crm_shared::error::CrmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    /// 本地参数校验失败，请求不会发出
    #[error("{0}")]
    Validation(String),

    /// 网关返回了非 2xx 响应；detail 取自响应体的 message 或 error 字段
    #[error("网关返回错误: 网关={gateway}, status={status}")]
    Gateway {
        gateway: String,
        status: u16,
        detail: Option<String>,
    },

    #[error("网关请求超时: {gateway}")]
    Timeout { gateway: String },

    #[error("网关请求失败: 网关={gateway}, 原因={reason}")]
    Transport { gateway: String, reason: String },

    #[error("媒体处理失败: {0}")]
    Media(String),

    #[error(transparent)]
    Shared(#[from] CrmError),
}

impl NotificationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn from_reqwest(gateway: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                gateway: gateway.to_string(),
            }
        } else {
            Self::Transport {
                gateway: gateway.to_string(),
                reason: err.to_string(),
            }
        }
    }
}
