//! 重试策略与执行器
//!
//! 线性退避，用于瞬时故障（网络抖动、请求超时）的自动恢复。
//! 业务逻辑错误（如凭据错误）不应被重试，由调用方通过 `is_retryable` 闭包控制。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// 重试策略配置
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    /// 退避步长
    pub step: Duration,
}

impl RetryPolicy {
    /// 线性退避策略：第 N 次重试前等待 step * (N + 1)
    pub fn linear(max_retries: u32, step: Duration) -> Self {
        Self { max_retries, step }
    }

    /// 计算第 N 次重试的等待时间（attempt 从 0 开始），不超过 step * max_retries
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_add(1).min(self.max_retries.max(1));
        self.step.saturating_mul(factor)
    }

    /// attempt 表示已经失败的次数，当 attempt < max_retries 时返回 true
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// 带重试的异步执行器
///
/// 对任意异步操作应用重试策略。仅在操作返回可重试错误时才重试，
/// 其余错误直接向上传播。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "操作在重试后成功");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "操作失败且不可重试，直接返回错误"
                    );
                    return Err(err);
                }

                if !policy.should_retry(attempt) {
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_retries = policy.max_retries,
                        error = %err,
                        "已达最大重试次数，放弃重试"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "操作失败，将在退避后重试"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
