//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出，在指定端口暴露 `/metrics`
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 `/metrics` 的 HELP 注释中
pub fn describe_metrics() {
    metrics::describe_counter!(
        "notifications_sent_total",
        "Total number of notification send attempts"
    );
    metrics::describe_counter!(
        "activity_log_failures_total",
        "Total number of activity records that could not be persisted"
    );
    metrics::describe_counter!(
        "admin_auth_attempts_total",
        "Total number of document store admin authentication attempts"
    );
    metrics::describe_histogram!(
        "gateway_request_duration_seconds",
        "Gateway request duration in seconds"
    );
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次通知发送
#[inline]
pub fn record_notification(channel: &str, template: &str, success: bool) {
    metrics::counter!(
        "notifications_sent_total",
        "channel" => channel.to_string(),
        "template" => template.to_string(),
        "status" => if success { "sent" } else { "failed" }
    )
    .increment(1);
}

/// 记录活动日志写入失败
#[inline]
pub fn record_activity_log_failure(channel: &str) {
    metrics::counter!(
        "activity_log_failures_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录管理员认证尝试
#[inline]
pub fn record_admin_auth(outcome: &str) {
    metrics::counter!(
        "admin_auth_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录网关请求耗时
#[inline]
pub fn record_gateway_request(gateway: &str, endpoint: &str, duration_secs: f64) {
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "gateway" => gateway.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}
