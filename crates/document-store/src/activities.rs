//! 通知活动审计记录
//!
//! WhatsApp 与邮件的活动分别写入 `whatsapp_activities` 与 `email_activities`，
//! 记录只追加，不更新也不删除。

use async_trait::async_trait;
use crm_shared::error::Result;
use crm_shared::models::{NotificationActivity, NotificationChannel};

use crate::client::{PocketBaseClient, quote_filter_value};

/// 活动记录的持久化接口
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// 追加一条活动记录，返回存储后的记录
    async fn create_activity(&self, activity: &NotificationActivity)
    -> Result<NotificationActivity>;

    /// 某个订单在指定渠道上的全部活动，最新的在前
    async fn list_activities(
        &self,
        channel: NotificationChannel,
        order_id: &str,
    ) -> Result<Vec<NotificationActivity>>;
}

#[async_trait]
impl ActivityStore for PocketBaseClient {
    async fn create_activity(
        &self,
        activity: &NotificationActivity,
    ) -> Result<NotificationActivity> {
        let mut stored: NotificationActivity =
            self.create(activity.channel.collection(), activity).await?;
        stored.channel = activity.channel;
        Ok(stored)
    }

    async fn list_activities(
        &self,
        channel: NotificationChannel,
        order_id: &str,
    ) -> Result<Vec<NotificationActivity>> {
        let filter = format!("order_id = {}", quote_filter_value(order_id));
        let mut items: Vec<NotificationActivity> = self
            .full_list(channel.collection(), Some("-timestamp"), Some(&filter))
            .await?;
        for item in &mut items {
            item.channel = channel;
        }
        Ok(items)
    }
}
