//! 统一错误处理模块
//!
//! 定义 CRM 各组件共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum CrmError {
    // ==================== 文档存储错误 ====================
    #[error("文档存储错误: status={status}, {message}")]
    DocumentStore { status: u16, message: String },

    #[error("记录未找到: {collection} id={id}")]
    NotFound { collection: String, id: String },

    // ==================== 认证错误 ====================
    #[error("未授权访问: {0}")]
    Unauthorized(String),

    #[error("管理员认证失败: {0}")]
    AuthenticationFailed(String),

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== 外部服务错误 ====================
    #[error("外部服务超时: {service}")]
    ExternalServiceTimeout { service: String },

    #[error("网络传输失败: {service} - {message}")]
    Transport { service: String, message: String },

    // ==================== 序列化 ====================
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, CrmError>;

impl CrmError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::DocumentStore { .. } => "DOCUMENT_STORE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ExternalServiceTimeout { .. } => "EXTERNAL_SERVICE_TIMEOUT",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有传输层故障（超时、连接失败）可以重试；
    /// 对端给出的业务拒绝（凭据错误、参数校验失败）重试也不会成功。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalServiceTimeout { .. } | Self::Transport { .. }
        )
    }
}
