//! 订单业务事件通知
//!
//! `OrderNotifier` 通过 WhatsApp 发送，`EmailNotifier` 通过邮件发送。
//! 两者都在网关返回后写入活动记录，记录状态反映网关结果；
//! 活动记录失败不改变返回给调用方的 `SendResult`。
//!
//! 号码规范化不是幂等的（8 位号码补前缀后恰好 10 位，会再被补一次），
//! 所以网关收到的是原始号码，由 `WhatsAppClient` 规范化一次；
//! 活动记录里的收件人对同一原始号码做同样的一次规范化。

use std::sync::Arc;

use crm_shared::models::{
    ActivityStatus, NotificationActivity, NotificationChannel, Order, OrderStatus, PaymentStatus,
};
use crm_shared::observability::metrics::record_notification;
use serde_json::json;
use tracing::info;

use crate::activity::ActivityLogger;
use crate::email::EmailGateway;
use crate::media::MediaKind;
use crate::phone::PhoneFormatter;
use crate::sender::SendResult;
use crate::templates::{EventContext, NotificationEvent, TemplateEngine, TemplateVariables};
use crate::whatsapp::WhatsAppGateway;

impl NotificationEvent {
    /// 订单状态变化对应的通知事件，无需通知时返回 None
    pub fn for_transition(previous: OrderStatus, next: OrderStatus) -> Option<Self> {
        if previous == next {
            return None;
        }
        match (previous, next) {
            (_, OrderStatus::Shipped) => Some(Self::OrderShipped),
            (_, OrderStatus::OutForDelivery) => Some(Self::OutForDelivery),
            (_, OrderStatus::Delivered) => Some(Self::OrderDelivered),
            (OrderStatus::Pending, OrderStatus::Processing) => Some(Self::OrderConfirmation),
            _ => None,
        }
    }

    /// 支付状态变化对应的通知事件
    pub fn for_payment_transition(previous: PaymentStatus, next: PaymentStatus) -> Option<Self> {
        if previous == next {
            return None;
        }
        match next {
            PaymentStatus::Paid => Some(Self::PaymentSuccess),
            PaymentStatus::Failed => Some(Self::PaymentFailed),
            _ => None,
        }
    }
}

/// 活动记录中的消息内容：发送的文本、变量表与网关结果
fn message_content(message: &str, variables: Option<&TemplateVariables>, result: &SendResult) -> String {
    let mut content = json!({
        "message": message,
        "response": {
            "success": result.success,
            "message": result.message,
            "status": if result.success { "success" } else { "failed" },
            "timestamp": result.timestamp,
        }
    });
    if let Some(variables) = variables {
        content["variables"] = json!(variables);
    }
    content.to_string()
}

fn activity_for(
    channel: NotificationChannel,
    order_id: &str,
    template_name: &str,
    recipient: &str,
    content: String,
    result: &SendResult,
) -> NotificationActivity {
    let activity = NotificationActivity::new(
        channel,
        order_id,
        template_name,
        recipient,
        ActivityStatus::from_success(result.success),
        content,
    );
    if result.success {
        activity
    } else {
        activity.with_error(result.message.clone())
    }
}

// ---------------------------------------------------------------------------
// WhatsApp
// ---------------------------------------------------------------------------

pub struct OrderNotifier {
    whatsapp: Arc<dyn WhatsAppGateway>,
    logger: Arc<ActivityLogger>,
    templates: Arc<TemplateEngine>,
    phone: PhoneFormatter,
}

impl OrderNotifier {
    pub fn new(
        whatsapp: Arc<dyn WhatsAppGateway>,
        logger: Arc<ActivityLogger>,
        templates: Arc<TemplateEngine>,
        phone: PhoneFormatter,
    ) -> Self {
        Self {
            whatsapp,
            logger,
            templates,
            phone,
        }
    }

    /// 发送业务事件通知并记录活动
    pub async fn notify(&self, event: NotificationEvent, order: &Order, ctx: &EventContext) -> SendResult {
        let recipient = self.phone.format(&order.customer_phone);
        let rendered = self.templates.whatsapp(event, order, ctx);

        let result = self
            .whatsapp
            .send_text(&order.customer_phone, &rendered.message, rendered.variables.clone())
            .await;
        record_notification("whatsapp", event.template_name(), result.success);
        info!(
            order_id = %order.id,
            event = %event,
            success = result.success,
            "WhatsApp 业务通知已处理"
        );

        let content = message_content(&rendered.message, rendered.variables.as_ref(), &result);
        self.logger
            .log(activity_for(
                NotificationChannel::WhatsApp,
                &order.id,
                event.template_name(),
                &recipient,
                content,
                &result,
            ))
            .await;

        result
    }

    /// 订单状态已从 previous 变为 order.status 时发送对应通知
    pub async fn notify_status_change(
        &self,
        order: &Order,
        previous: OrderStatus,
        ctx: &EventContext,
    ) -> Option<SendResult> {
        let event = NotificationEvent::for_transition(previous, order.status)?;
        Some(self.notify(event, order, ctx).await)
    }

    pub async fn send_order_confirmation(&self, order: &Order) -> SendResult {
        self.notify(NotificationEvent::OrderConfirmation, order, &EventContext::default())
            .await
    }

    pub async fn send_payment_success(&self, order: &Order) -> SendResult {
        self.notify(NotificationEvent::PaymentSuccess, order, &EventContext::default())
            .await
    }

    pub async fn send_payment_failed(&self, order: &Order, retry_url: &str) -> SendResult {
        self.notify(NotificationEvent::PaymentFailed, order, &EventContext::with_link(retry_url))
            .await
    }

    pub async fn send_order_shipped(&self, order: &Order, tracking_link: &str, carrier: &str) -> SendResult {
        let ctx = EventContext {
            link: Some(tracking_link.to_string()),
            carrier: Some(carrier.to_string()),
            ..Default::default()
        };
        self.notify(NotificationEvent::OrderShipped, order, &ctx).await
    }

    pub async fn send_out_for_delivery(&self, order: &Order) -> SendResult {
        self.notify(NotificationEvent::OutForDelivery, order, &EventContext::default())
            .await
    }

    pub async fn send_order_delivered(&self, order: &Order, feedback_link: &str) -> SendResult {
        self.notify(NotificationEvent::OrderDelivered, order, &EventContext::with_link(feedback_link))
            .await
    }

    pub async fn send_review_request(&self, order: &Order, review_link: &str) -> SendResult {
        self.notify(NotificationEvent::RequestReview, order, &EventContext::with_link(review_link))
            .await
    }

    pub async fn send_refund_confirmation(&self, order: &Order, amount: f64) -> SendResult {
        let ctx = EventContext {
            amount: Some(amount),
            ..Default::default()
        };
        self.notify(NotificationEvent::RefundConfirmation, order, &ctx).await
    }

    pub async fn send_reorder_reminder(&self, order: &Order, days_since_delivery: u32, reorder_link: &str) -> SendResult {
        let ctx = EventContext {
            link: Some(reorder_link.to_string()),
            days: Some(days_since_delivery),
            ..Default::default()
        };
        self.notify(NotificationEvent::ReorderReminder, order, &ctx).await
    }

    /// 发送自由文本并记录活动；order_id 为空时记录不关联订单
    pub async fn send_custom_text(&self, order_id: &str, to: &str, message: &str) -> SendResult {
        let recipient = self.phone.format(to);
        let result = self.whatsapp.send_text(to, message, None).await;
        record_notification("whatsapp", "custom_message", result.success);

        let content = message_content(message, None, &result);
        self.logger
            .log(activity_for(
                NotificationChannel::WhatsApp,
                order_id,
                "custom_message",
                &recipient,
                content,
                &result,
            ))
            .await;
        result
    }

    /// 发送媒体消息并记录活动，记录中保留原始媒体引用
    pub async fn send_media(
        &self,
        order_id: &str,
        to: &str,
        kind: MediaKind,
        url: &str,
        caption: Option<String>,
        filename: Option<String>,
    ) -> SendResult {
        let recipient = self.phone.format(to);
        let (template, result) = match kind {
            MediaKind::Image => (
                "custom_image",
                self.whatsapp.send_image(to, url, caption.clone(), None).await,
            ),
            MediaKind::Video => (
                "custom_video",
                self.whatsapp.send_video(to, url, caption.clone(), None).await,
            ),
            MediaKind::Document => (
                "custom_document",
                self.whatsapp
                    .send_document(to, url, filename.as_deref().unwrap_or_default(), caption.clone(), None)
                    .await,
            ),
        };
        record_notification("whatsapp", template, result.success);

        let content = message_content(caption.as_deref().unwrap_or_default(), None, &result);
        self.logger
            .log(
                activity_for(NotificationChannel::WhatsApp, order_id, template, &recipient, content, &result)
                    .with_media_url(url),
            )
            .await;
        result
    }
}

// ---------------------------------------------------------------------------
// 邮件
// ---------------------------------------------------------------------------

pub struct EmailNotifier {
    email: Arc<dyn EmailGateway>,
    logger: Arc<ActivityLogger>,
    templates: Arc<TemplateEngine>,
}

impl EmailNotifier {
    pub fn new(email: Arc<dyn EmailGateway>, logger: Arc<ActivityLogger>, templates: Arc<TemplateEngine>) -> Self {
        Self {
            email,
            logger,
            templates,
        }
    }

    /// 向订单的客户邮箱发送业务事件邮件并记录活动
    pub async fn notify(&self, event: NotificationEvent, order: &Order, ctx: &EventContext) -> SendResult {
        let recipient = order.customer_email.trim();
        let content = self.templates.email(event, order, ctx);

        let mut variables = TemplateVariables::new();
        variables.insert("orderId".to_string(), order.id.clone());
        variables.insert("templateName".to_string(), event.template_name().to_string());

        let result = self
            .email
            .send_email(recipient, &content.subject, &content.body, Some(variables))
            .await;
        record_notification("email", event.template_name(), result.success);
        info!(order_id = %order.id, event = %event, success = result.success, "邮件业务通知已处理");

        let record = message_content(&content.body, None, &result);
        self.logger
            .log(
                activity_for(
                    NotificationChannel::Email,
                    &order.id,
                    event.template_name(),
                    recipient,
                    record,
                    &result,
                )
                .with_subject(content.subject),
            )
            .await;

        result
    }
}
