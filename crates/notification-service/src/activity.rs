//! 活动记录器
//!
//! 尽力而为地写入审计记录：总是以当前时间打戳，受超时约束，
//! 任何失败只记录 warn 日志和指标，不向调用方传播。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crm_document_store::ActivityStore;
use crm_shared::models::NotificationActivity;
use crm_shared::observability::metrics::record_activity_log_failure;
use tracing::{debug, warn};

pub struct ActivityLogger {
    store: Arc<dyn ActivityStore>,
    timeout: Duration,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn ActivityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// 写入活动记录，返回是否写入成功
    pub async fn log(&self, mut activity: NotificationActivity) -> bool {
        activity.timestamp = Utc::now();
        let channel = activity.channel;

        match tokio::time::timeout(self.timeout, self.store.create_activity(&activity)).await {
            Ok(Ok(stored)) => {
                debug!(
                    channel = %channel,
                    order_id = %activity.order_id,
                    template = %activity.template_name,
                    activity_id = stored.id.as_deref().unwrap_or_default(),
                    "活动记录已写入"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(channel = %channel, order_id = %activity.order_id, error = %e, "活动记录写入失败");
                record_activity_log_failure(channel.as_str());
                false
            }
            Err(_) => {
                warn!(
                    channel = %channel,
                    order_id = %activity.order_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "活动记录写入超时"
                );
                record_activity_log_failure(channel.as_str());
                false
            }
        }
    }
}
