//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! 所有凭据只从外部配置读取，代码中不保留任何回退口令。

use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::observability::ObservabilityConfig;

/// 文档存储（PocketBase）配置
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PocketBaseConfig {
    pub url: String,
    pub admin_email: String,
    pub admin_password: String,
    /// 管理员认证路径，新版本 PocketBase 使用 `/api/collections/_superusers/auth-with-password`
    pub auth_path: String,
    /// 单次认证请求的超时
    pub auth_timeout_ms: u64,
    /// 传输层失败时的最大重试次数（不含首次）
    pub max_auth_retries: u32,
    /// 线性退避的步长：第 n 次重试前等待 (n + 1) * step
    pub auth_retry_step_ms: u64,
    /// 无法从令牌解析过期时间时使用的会话有效期
    pub session_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
    /// 只给出 `record/filename` 的文件引用所属的默认集合
    pub default_file_collection: Option<String>,
}

impl Default for PocketBaseConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090".to_string(),
            admin_email: String::new(),
            admin_password: String::new(),
            auth_path: "/api/admins/auth-with-password".to_string(),
            auth_timeout_ms: 15_000,
            max_auth_retries: 3,
            auth_retry_step_ms: 1_000,
            session_ttl_seconds: 14 * 24 * 3600,
            request_timeout_seconds: 30,
            default_file_collection: None,
        }
    }
}

impl PocketBaseConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn auth_retry_step(&self) -> Duration {
        Duration::from_millis(self.auth_retry_step_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

// 口令不进日志
impl fmt::Debug for PocketBaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PocketBaseConfig")
            .field("url", &self.url)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &"<redacted>")
            .field("auth_path", &self.auth_path)
            .field("auth_timeout_ms", &self.auth_timeout_ms)
            .field("max_auth_retries", &self.max_auth_retries)
            .field("auth_retry_step_ms", &self.auth_retry_step_ms)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("default_file_collection", &self.default_file_collection)
            .finish()
    }
}

/// 消息网关（WhatsApp / 邮件）配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    /// 健康检查使用较短的超时，避免界面长时间等待
    pub status_timeout_seconds: u64,
}

impl GatewayConfig {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            request_timeout_seconds: 30,
            status_timeout_seconds: 8,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_seconds)
    }
}

fn default_whatsapp_gateway() -> GatewayConfig {
    GatewayConfig::with_base_url("http://127.0.0.1:3001/whatsapp-api")
}

fn default_email_gateway() -> GatewayConfig {
    GatewayConfig::with_base_url("http://127.0.0.1:3001/api/email")
}

impl Default for GatewayConfig {
    fn default() -> Self {
        default_whatsapp_gateway()
    }
}

/// 通知内容相关配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 号码规范化时补齐的国家码
    pub country_code: String,
    /// 店铺前台地址，用于生成订单链接并解析以 `/` 开头的媒体路径
    pub storefront_url: String,
    pub brand_name: String,
    /// 本地图片内联为 base64 的大小上限
    pub media_inline_max_bytes: usize,
    pub activity_log_timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            country_code: "91".to_string(),
            storefront_url: "http://localhost:5173".to_string(),
            brand_name: "Konipai".to_string(),
            media_inline_max_bytes: 5 * 1024 * 1024,
            activity_log_timeout_ms: 5_000,
        }
    }
}

impl NotificationConfig {
    pub fn activity_log_timeout(&self) -> Duration {
        Duration::from_millis(self.activity_log_timeout_ms)
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub pocketbase: PocketBaseConfig,
    #[serde(default = "default_whatsapp_gateway")]
    pub whatsapp: GatewayConfig,
    #[serde(default = "default_email_gateway")]
    pub email: GatewayConfig,
    pub notification: NotificationConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "crm".to_string(),
            environment: "development".to_string(),
            pocketbase: PocketBaseConfig::default(),
            whatsapp: default_whatsapp_gateway(),
            email: default_email_gateway(),
            notification: NotificationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（CRM_ 前缀，段之间用双下划线，如 CRM_POCKETBASE__URL -> pocketbase.url）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("CRM_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("CRM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 管理员凭据是否已配置
    pub fn has_admin_credentials(&self) -> bool {
        !self.pocketbase.admin_email.is_empty() && !self.pocketbase.admin_password.is_empty()
    }
}
