//! 组件装配
//!
//! 从 `AppConfig` 构建文档存储客户端、两个消息网关、活动记录器与通知器，
//! 并提供 CLI 与端到端测试共用的业务流程：发送事件通知、推进订单状态后通知。

use std::sync::Arc;

use crm_document_store::ActivityStore;
use crm_document_store::PocketBaseClient;
use crm_document_store::dashboard::{self, Dashboard};
use crm_document_store::orders::OrderRepository;
use crm_shared::config::AppConfig;
use crm_shared::models::{
    NewOrder, NotificationActivity, NotificationChannel, Order, OrderStatus, PaymentStatus,
};
use serde::Serialize;
use tracing::info;

use crate::activity::ActivityLogger;
use crate::email::{EmailClient, EmailGateway};
use crate::error::NotificationError;
use crate::media::MediaResolver;
use crate::notifier::{EmailNotifier, OrderNotifier};
use crate::phone::PhoneFormatter;
use crate::sender::{GatewayHttp, SendResult};
use crate::status::ConnectionStatus;
use crate::templates::{EventContext, NotificationEvent, TemplateEngine};
use crate::whatsapp::{WhatsAppClient, WhatsAppGateway};

/// 两个网关的连接状态
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatuses {
    pub whatsapp: ConnectionStatus,
    pub email: ConnectionStatus,
}

/// 订单状态更新结果；未映射到业务事件时 notification 为空
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<SendResult>,
}

pub struct App {
    config: AppConfig,
    store: Arc<PocketBaseClient>,
    orders: OrderRepository,
    whatsapp: Arc<dyn WhatsAppGateway>,
    email: Arc<dyn EmailGateway>,
    order_notifier: OrderNotifier,
    email_notifier: EmailNotifier,
}

impl App {
    pub fn from_config(config: AppConfig) -> Result<Self, NotificationError> {
        let store = Arc::new(PocketBaseClient::from_config(&config.pocketbase)?);
        let orders = OrderRepository::new(store.clone());

        let whatsapp_http = GatewayHttp::new("whatsapp", "WhatsApp API", &config.whatsapp)?;
        let media = MediaResolver::new(
            whatsapp_http.http().clone(),
            &config.pocketbase,
            &config.notification,
        );
        let phone = PhoneFormatter::new(config.notification.country_code.as_str());
        let whatsapp: Arc<dyn WhatsAppGateway> =
            Arc::new(WhatsAppClient::new(whatsapp_http, phone.clone(), media));
        let email: Arc<dyn EmailGateway> = Arc::new(EmailClient::new(GatewayHttp::new(
            "email",
            "Email API",
            &config.email,
        )?));

        let logger = Arc::new(ActivityLogger::new(
            store.clone(),
            config.notification.activity_log_timeout(),
        ));
        let templates = Arc::new(TemplateEngine::new(
            config.notification.brand_name.as_str(),
            config.notification.storefront_url.as_str(),
        ));

        let order_notifier = OrderNotifier::new(whatsapp.clone(), logger.clone(), templates.clone(), phone);
        let email_notifier = EmailNotifier::new(email.clone(), logger, templates);

        info!(
            store = %config.pocketbase.url,
            whatsapp = %config.whatsapp.base_url,
            email = %config.email.base_url,
            "通知服务组件已装配"
        );

        Ok(Self {
            config,
            store,
            orders,
            whatsapp,
            email,
            order_notifier,
            email_notifier,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orders(&self) -> &OrderRepository {
        &self.orders
    }

    pub fn whatsapp(&self) -> &Arc<dyn WhatsAppGateway> {
        &self.whatsapp
    }

    pub fn order_notifier(&self) -> &OrderNotifier {
        &self.order_notifier
    }

    /// 并发检查两个网关
    pub async fn gateway_statuses(&self) -> GatewayStatuses {
        let (whatsapp, email) = tokio::join!(self.whatsapp.check_status(), self.email.check_status());
        GatewayStatuses { whatsapp, email }
    }

    /// 按订单号加载订单并通过指定渠道发送业务事件通知
    pub async fn notify_order(
        &self,
        order_id: &str,
        event: NotificationEvent,
        ctx: &EventContext,
        channel: NotificationChannel,
    ) -> Result<SendResult, NotificationError> {
        let order = self.orders.get(order_id).await?;
        Ok(match channel {
            NotificationChannel::WhatsApp => self.order_notifier.notify(event, &order, ctx).await,
            NotificationChannel::Email => self.email_notifier.notify(event, &order, ctx).await,
        })
    }

    /// 创建订单；notify 为真时向客户发送下单确认
    pub async fn create_order(
        &self,
        new_order: &NewOrder,
        notify: bool,
    ) -> Result<TransitionOutcome, NotificationError> {
        let order = self.orders.create(new_order).await?;
        let notification = if notify {
            Some(self.order_notifier.send_order_confirmation(&order).await)
        } else {
            None
        };
        Ok(TransitionOutcome { order, notification })
    }

    /// 更新订单履约状态，并发送状态变化对应的 WhatsApp 通知
    pub async fn transition_order(
        &self,
        order_id: &str,
        status: OrderStatus,
        ctx: &EventContext,
    ) -> Result<TransitionOutcome, NotificationError> {
        let previous = self.orders.get(order_id).await?.status;
        let order = self.orders.update_status(order_id, status).await?;
        let notification = self.order_notifier.notify_status_change(&order, previous, ctx).await;
        Ok(TransitionOutcome { order, notification })
    }

    /// 更新支付状态，并在变为已支付或失败时通知客户
    pub async fn update_payment(
        &self,
        order_id: &str,
        status: PaymentStatus,
        ctx: &EventContext,
    ) -> Result<TransitionOutcome, NotificationError> {
        let previous = self.orders.get(order_id).await?.payment_status;
        let order = self.orders.update_payment_status(order_id, status).await?;
        let notification = match NotificationEvent::for_payment_transition(previous, status) {
            Some(event) => Some(self.order_notifier.notify(event, &order, ctx).await),
            None => None,
        };
        Ok(TransitionOutcome { order, notification })
    }

    /// 登记物流信息并把订单标记为已发货
    pub async fn ship_order(
        &self,
        order_id: &str,
        tracking_code: &str,
        tracking_url: &str,
        carrier: Option<String>,
    ) -> Result<TransitionOutcome, NotificationError> {
        let previous = self.orders.get(order_id).await?.status;
        let order = self.orders.mark_shipped(order_id, tracking_code, tracking_url).await?;
        let ctx = EventContext {
            carrier,
            ..Default::default()
        };
        let notification = self.order_notifier.notify_status_change(&order, previous, &ctx).await;
        Ok(TransitionOutcome { order, notification })
    }

    pub async fn activities(
        &self,
        channel: NotificationChannel,
        order_id: &str,
    ) -> Result<Vec<NotificationActivity>, NotificationError> {
        Ok(self.store.list_activities(channel, order_id).await?)
    }

    pub async fn dashboard(&self) -> Result<Dashboard, NotificationError> {
        Ok(dashboard::load_dashboard(&self.orders).await?)
    }
}
