//! 管理员会话
//!
//! 文档存储的管理员接口需要 Bearer token。`AdminSession` 持有当前会话，
//! 保证任意时刻最多只有一次认证请求在途：并发调用方共享同一个认证 future，
//! 认证结果（成功或失败）由所有等待者共同接收。
//!
//! 状态流转：
//!
//! ```text
//! Unauthenticated ──ensure──▶ Authenticating ──ok──▶ Authenticated
//!        ▲                          │                      │
//!        └──────────err─────────────┘◀──expired/invalidate─┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use crm_shared::config::PocketBaseConfig;
use crm_shared::error::CrmError;
use crm_shared::observability::metrics::record_admin_auth;
use crm_shared::retry::{RetryPolicy, retry_with_policy};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 会话到期前预留的时钟偏差
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// 错误
// ---------------------------------------------------------------------------

/// 认证错误
///
/// 同一次认证的结果会被所有并发等待者共享，因此必须可克隆，
/// 底层错误只保留其文本描述。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("管理员凭据未配置")]
    MissingCredentials,

    #[error("认证请求超时 ({0:?})")]
    Timeout(Duration),

    #[error("认证请求传输失败: {0}")]
    Transport(String),

    #[error("认证被拒绝: status={status}, {message}")]
    Rejected { status: u16, message: String },

    #[error("认证在 {attempts} 次尝试后仍失败: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl AuthError {
    /// 超时与传输失败属于瞬时故障，可以重试；任何来自认证端点的响应都不重试
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

impl From<AuthError> for CrmError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Timeout(_) => CrmError::ExternalServiceTimeout {
                service: "pocketbase-auth".to_string(),
            },
            AuthError::Transport(message) => CrmError::Transport {
                service: "pocketbase-auth".to_string(),
                message,
            },
            other => CrmError::AuthenticationFailed(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// 认证器
// ---------------------------------------------------------------------------

/// 认证端点返回的管理员身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub token: String,
    pub admin_id: String,
    pub email: String,
}

/// 执行一次管理员认证请求，不含重试与超时控制
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminAuthenticator: Send + Sync {
    async fn authenticate(&self, identity: &str, password: &str)
    -> Result<AdminIdentity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct AuthResponseBody {
    token: String,
    #[serde(default)]
    admin: Option<AdminBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdminBody {
    id: String,
    email: String,
}

/// 基于 HTTP 的认证器：`POST {url}{auth_path}`，请求体 `{identity, password}`
pub struct HttpAdminAuthenticator {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAdminAuthenticator {
    pub fn new(http: reqwest::Client, config: &PocketBaseConfig) -> Self {
        Self {
            http,
            endpoint: format!("{}{}", config.url.trim_end_matches('/'), config.auth_path),
            timeout: config.auth_timeout(),
        }
    }
}

#[async_trait]
impl AdminAuthenticator for HttpAdminAuthenticator {
    async fn authenticate(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<AdminIdentity, AuthError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&json!({ "identity": identity, "password": password }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout(self.timeout)
                } else {
                    AuthError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: AuthResponseBody =
            response.json().await.map_err(|e| AuthError::Rejected {
                status: status.as_u16(),
                message: format!("无法解析认证响应: {e}"),
            })?;
        let admin = body.admin.unwrap_or_default();

        Ok(AdminIdentity {
            token: body.token,
            admin_id: admin.id,
            email: admin.email,
        })
    }
}

// ---------------------------------------------------------------------------
// 会话
// ---------------------------------------------------------------------------

/// 已认证的管理员会话
#[derive(Clone, PartialEq, Eq)]
pub struct AdminSessionToken {
    token: String,
    pub admin_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AdminSessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSessionToken")
            .field("token", &"[REDACTED]")
            .field("admin_id", &self.admin_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AdminSessionToken {
    fn from_identity(identity: AdminIdentity, fallback_ttl: Duration) -> Self {
        let expires_at = jwt_expiry(&identity.token).unwrap_or_else(|| {
            Utc::now()
                + chrono::Duration::from_std(fallback_ttl).unwrap_or(chrono::Duration::days(14))
        });
        Self {
            token: identity.token,
            admin_id: identity.admin_id,
            email: identity.email,
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// 距离过期不足 60 秒即视为失效
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(EXPIRY_SKEW.as_secs() as i64) < self.expires_at
    }
}

/// 从 JWT 的 payload 中读取 `exp`，不校验签名
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// 认证尝试参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub attempt_timeout: Duration,
    pub max_retries: u32,
    pub retry_step: Duration,
    pub fallback_ttl: Duration,
}

impl From<&PocketBaseConfig> for SessionSettings {
    fn from(config: &PocketBaseConfig) -> Self {
        Self {
            attempt_timeout: config.auth_timeout(),
            max_retries: config.max_auth_retries,
            retry_step: config.auth_retry_step(),
            fallback_ttl: config.session_ttl(),
        }
    }
}

#[derive(Clone)]
struct Credentials {
    identity: String,
    password: String,
}

type AuthAttempt = Shared<BoxFuture<'static, Result<AdminSessionToken, AuthError>>>;

enum SessionState {
    Unauthenticated,
    Authenticating { generation: u64, attempt: AuthAttempt },
    Authenticated(AdminSessionToken),
}

struct Inner {
    state: SessionState,
    generation: u64,
}

/// 单飞管理员会话
///
/// 作为显式对象注入到需要管理员权限的组件中，不使用进程级全局状态。
pub struct AdminSession {
    authenticator: Arc<dyn AdminAuthenticator>,
    credentials: Credentials,
    settings: SessionSettings,
    inner: Mutex<Inner>,
}

impl AdminSession {
    pub fn new(
        authenticator: Arc<dyn AdminAuthenticator>,
        identity: impl Into<String>,
        password: impl Into<String>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            authenticator,
            credentials: Credentials {
                identity: identity.into(),
                password: password.into(),
            },
            settings,
            inner: Mutex::new(Inner {
                state: SessionState::Unauthenticated,
                generation: 0,
            }),
        }
    }

    /// 按配置创建基于 HTTP 认证器的会话
    pub fn from_config(http: reqwest::Client, config: &PocketBaseConfig) -> Self {
        Self::new(
            Arc::new(HttpAdminAuthenticator::new(http, config)),
            config.admin_email.clone(),
            config.admin_password.clone(),
            SessionSettings::from(config),
        )
    }

    /// 返回有效的会话，必要时发起认证
    ///
    /// 认证进行中时，后续调用方等待同一个认证 future，不会发出新的请求。
    pub async fn ensure_session(&self) -> Result<AdminSessionToken, AuthError> {
        let (generation, attempt) = {
            let mut inner = self.inner.lock();
            match &inner.state {
                SessionState::Authenticated(token) if token.is_valid_at(Utc::now()) => {
                    return Ok(token.clone());
                }
                SessionState::Authenticating {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                _ => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let attempt = self.start_attempt();
                    debug!(generation, "开始新的管理员认证");
                    inner.state = SessionState::Authenticating {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let result = attempt.await;

        let mut inner = self.inner.lock();
        if let SessionState::Authenticating {
            generation: current,
            ..
        } = &inner.state
        {
            // 只有发起这次认证的那一代状态才被替换，避免覆盖更新的认证
            if *current == generation {
                inner.state = match &result {
                    Ok(token) => SessionState::Authenticated(token.clone()),
                    Err(_) => SessionState::Unauthenticated,
                };
            }
        }

        result
    }

    /// 丢弃已缓存的会话；进行中的认证不受影响
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Authenticated(_)) {
            info!("管理员会话已失效，下次请求将重新认证");
            inner.state = SessionState::Unauthenticated;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            &self.inner.lock().state,
            SessionState::Authenticated(token) if token.is_valid_at(Utc::now())
        )
    }

    fn start_attempt(&self) -> AuthAttempt {
        authenticate_with_retry(
            self.authenticator.clone(),
            self.credentials.clone(),
            self.settings.clone(),
        )
        .boxed()
        .shared()
    }
}

async fn authenticate_with_retry(
    authenticator: Arc<dyn AdminAuthenticator>,
    credentials: Credentials,
    settings: SessionSettings,
) -> Result<AdminSessionToken, AuthError> {
    if credentials.identity.trim().is_empty() || credentials.password.is_empty() {
        warn!("管理员凭据为空，拒绝发起认证");
        record_admin_auth("missing_credentials");
        return Err(AuthError::MissingCredentials);
    }

    let policy = RetryPolicy::linear(settings.max_retries, settings.retry_step);
    let attempt_timeout = settings.attempt_timeout;

    let result = retry_with_policy(&policy, "admin_auth", AuthError::is_transient, |attempt| {
        let authenticator = authenticator.clone();
        let credentials = credentials.clone();
        async move {
            debug!(attempt, "发送管理员认证请求");
            match tokio::time::timeout(
                attempt_timeout,
                authenticator.authenticate(&credentials.identity, &credentials.password),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(AuthError::Timeout(attempt_timeout)),
            }
        }
    })
    .await;

    match result {
        Ok(identity) => {
            record_admin_auth("success");
            let token = AdminSessionToken::from_identity(identity, settings.fallback_ttl);
            info!(admin_id = %token.admin_id, expires_at = %token.expires_at, "管理员认证成功");
            Ok(token)
        }
        Err(err) if err.is_transient() => {
            record_admin_auth("exhausted");
            Err(AuthError::RetriesExhausted {
                attempts: settings.max_retries + 1,
                last: err.to_string(),
            })
        }
        Err(err) => {
            record_admin_auth("rejected");
            Err(err)
        }
    }
}
