//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。
//! 所有二进制通过单一入口点配置可观测性，确保一致的日志格式和指标命名。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 日志级别（如 "info", "debug"），RUST_LOG 优先
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    pub json_logs: bool,

    /// 是否启动 Prometheus 指标端点
    pub metrics_enabled: bool,

    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// 可观测性资源守卫
///
/// 持有指标服务器任务的生命周期，drop 时记录关闭日志。
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("Shutting down observability...");
    }
}

/// 统一初始化可观测性
///
/// 先初始化日志，再按配置启动指标端点。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        "Observability initialized"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(service_name, config.metrics_port).await?)
    } else {
        metrics::describe_metrics();
        None
    };

    Ok(ObservabilityGuard {
        _metrics_handle: metrics_handle,
    })
}
