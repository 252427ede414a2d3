//! 通知模板
//!
//! 每个订单业务事件对应一条 WhatsApp 消息与一封邮件。模板化事件使用
//! `{{1}}`、`{{2}}` 形式的编号占位符，本地渲染后连同变量表一起发给网关，
//! 网关也可以自行套用模板。`{{brand}}` 在渲染时替换为配置的品牌名。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use crm_shared::models::Order;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::warn;

/// 模板变量表，键为占位符编号
pub type TemplateVariables = BTreeMap<String, String>;

/// 按顺序生成 `{"1": .., "2": ..}` 变量表
pub fn numbered<I, S>(values: I) -> TemplateVariables
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| ((i + 1).to_string(), v.into()))
        .collect()
}

/// 金额展示：整数不带小数位，其余保留两位
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    }
}

// ---------------------------------------------------------------------------
// 业务事件
// ---------------------------------------------------------------------------

/// 订单业务事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderConfirmation,
    PaymentSuccess,
    PaymentFailed,
    OrderShipped,
    OutForDelivery,
    OrderDelivered,
    RequestReview,
    RefundConfirmation,
    ReorderReminder,
}

impl NotificationEvent {
    pub const ALL: [NotificationEvent; 9] = [
        Self::OrderConfirmation,
        Self::PaymentSuccess,
        Self::PaymentFailed,
        Self::OrderShipped,
        Self::OutForDelivery,
        Self::OrderDelivered,
        Self::RequestReview,
        Self::RefundConfirmation,
        Self::ReorderReminder,
    ];

    /// 模板名，同时作为活动记录的 template_name
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::OrderConfirmation => "order_confirmation",
            Self::PaymentSuccess => "payment_success",
            Self::PaymentFailed => "payment_failed",
            Self::OrderShipped => "order_shipped",
            Self::OutForDelivery => "out_for_delivery",
            Self::OrderDelivered => "order_delivered",
            Self::RequestReview => "request_review",
            Self::RefundConfirmation => "refund_confirmation",
            Self::ReorderReminder => "reorder_reminder",
        }
    }

    /// 编号占位符模板；返回 None 的事件直接发送成品文本
    pub fn whatsapp_template(&self) -> Option<&'static str> {
        match self {
            Self::OrderConfirmation | Self::PaymentSuccess => None,
            Self::PaymentFailed => Some(
                "⚠️ Hi {{1}}, your payment for Order #{{2}} was unsuccessful.\n\n\
                 You can retry your payment here: {{3}}\n\n\
                 Let us know if you need help.",
            ),
            Self::OrderShipped => Some(
                "🚚 Great news, {{1}}! Your {{brand}} order (#{{2}}) is on its way. 🎁\n\n\
                 📦 Tracking: {{3}}\nCarrier: {{4}}\n\n\
                 Thanks again for shopping with us! 💫",
            ),
            Self::OutForDelivery => Some(
                "📬 Your {{brand}} order (#{{1}}) is out for delivery today, {{2}}! 🛵\n\n\
                 Please keep your phone nearby. You'll receive a confirmation once it's delivered.",
            ),
            Self::OrderDelivered => Some(
                "✅ Yay {{1}}, your {{brand}} order (#{{2}}) was delivered!\n\n\
                 We hope you love it ❤️ Let us know how your experience was: {{3}}\n\n\
                 Happy unboxing! 🎁",
            ),
            Self::RequestReview => Some(
                "Hi {{1}}, we'd love to hear your thoughts on your recent {{brand}} order (#{{2}})! 📝\n\n\
                 Leave a quick review here: {{3}}\n\n\
                 Thanks for being part of our journey ❤️",
            ),
            Self::RefundConfirmation => Some(
                "💸 Refund alert, {{1}}!\n\n\
                 Your refund for Order #{{2}} has been processed. Amount: ₹{{3}}\n\
                 Expected in your account within 5–7 business days.\n\n\
                 Have questions? Just reply here.",
            ),
            Self::ReorderReminder => Some(
                "Hey {{1}}, ready to restock your favorite items from {{brand}}? 🛍️\n\n\
                 Your last order (#{{2}}) was delivered {{3}} days ago. Here's a quick reorder link: {{4}}\n\n\
                 We're here when you're ready! ❤️",
            ),
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

impl FromStr for NotificationEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|event| event.template_name() == normalized)
            .ok_or_else(|| format!("未知的通知事件: {s}"))
    }
}

/// 事件的可选参数，缺省时由订单数据和店铺地址推导
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventContext {
    /// 支付重试、物流追踪、反馈、评价或复购链接
    pub link: Option<String>,
    pub carrier: Option<String>,
    pub amount: Option<f64>,
    pub days: Option<u32>,
}

impl EventContext {
    pub fn with_link(link: impl Into<String>) -> Self {
        Self {
            link: Some(link.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// 渲染
// ---------------------------------------------------------------------------

/// 渲染后的 WhatsApp 消息
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub event: NotificationEvent,
    pub message: String,
    /// 模板化事件的变量表
    pub variables: Option<TemplateVariables>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

/// 通知模板引擎
pub struct TemplateEngine {
    brand_name: String,
    storefront_url: String,
    /// 变量匹配正则
    variable_regex: Regex,
}

impl TemplateEngine {
    pub fn new(brand_name: impl Into<String>, storefront_url: impl Into<String>) -> Self {
        Self {
            brand_name: brand_name.into(),
            storefront_url: storefront_url.into().trim_end_matches('/').to_string(),
            // 匹配 {{1}}、{{ brand }} 等占位符
            variable_regex: Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap(),
        }
    }

    /// 替换模板中的占位符，变量表中没有的占位符原样保留
    pub fn render(&self, template: &str, variables: &TemplateVariables) -> String {
        self.variable_regex
            .replace_all(template, |caps: &Captures| {
                let var_name = &caps[1];
                match variables.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        warn!(variable = var_name, "模板变量未找到，保留原样");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    fn order_url(&self, order: &Order, suffix: &str) -> String {
        format!("{}/orders/{}{}", self.storefront_url, order.id, suffix)
    }

    /// 事件的编号变量；缺失的上下文按订单数据补全
    pub fn variables(
        &self,
        event: NotificationEvent,
        order: &Order,
        ctx: &EventContext,
    ) -> Option<TemplateVariables> {
        let name = order.customer_name.as_str();
        let id = order.id.as_str();
        let link = |suffix: &str| ctx.link.clone().unwrap_or_else(|| self.order_url(order, suffix));

        let values: Vec<String> = match event {
            NotificationEvent::OrderConfirmation | NotificationEvent::PaymentSuccess => return None,
            NotificationEvent::PaymentFailed => vec![name.into(), id.into(), link("/pay")],
            NotificationEvent::OrderShipped => {
                let tracking = [&ctx.link, &order.tracking_url, &order.tracking_code]
                    .into_iter()
                    .flatten()
                    .find(|value| !value.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| self.order_url(order, ""));
                let carrier = ctx
                    .carrier
                    .clone()
                    .unwrap_or_else(|| "Standard Shipping".to_string());
                vec![name.into(), id.into(), tracking, carrier]
            }
            NotificationEvent::OutForDelivery => vec![id.into(), name.into()],
            NotificationEvent::OrderDelivered => vec![name.into(), id.into(), link("/feedback")],
            NotificationEvent::RequestReview => vec![name.into(), id.into(), link("/review")],
            NotificationEvent::RefundConfirmation => {
                vec![name.into(), id.into(), format_amount(ctx.amount.unwrap_or(order.total))]
            }
            NotificationEvent::ReorderReminder => {
                let days = ctx.days.map(i64::from).unwrap_or_else(|| {
                    order
                        .created
                        .map(|created| (Utc::now() - created).num_days().max(0))
                        .unwrap_or(0)
                });
                vec![name.into(), id.into(), days.to_string(), link("/reorder")]
            }
        };
        Some(numbered(values))
    }

    /// 渲染 WhatsApp 消息
    pub fn whatsapp(
        &self,
        event: NotificationEvent,
        order: &Order,
        ctx: &EventContext,
    ) -> RenderedMessage {
        let variables = self.variables(event, order, ctx);
        let message = match (event.whatsapp_template(), &variables) {
            (Some(template), Some(vars)) => {
                let mut all = vars.clone();
                all.insert("brand".to_string(), self.brand_name.clone());
                self.render(template, &all)
            }
            _ => self.plain_message(event, order),
        };

        RenderedMessage {
            event,
            message,
            variables,
        }
    }

    fn plain_message(&self, event: NotificationEvent, order: &Order) -> String {
        match event {
            NotificationEvent::PaymentSuccess => format!(
                "✅ Payment received for Order #{}, {}! 💸\n\n\
                 We're now preparing your order for shipping. You'll get updates soon.\n\n\
                 Track it here: {}",
                order.id,
                order.customer_name,
                self.order_url(order, "")
            ),
            _ => {
                let items = order.line_items();
                let lines = items
                    .iter()
                    .map(|item| {
                        format!("{}x {} - ₹{}", item.quantity, item.name, format_amount(item.price))
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let total: f64 = items.iter().map(|item| item.line_total()).sum();
                format!(
                    "🎉 *Order Confirmation* 🎉\n\nHi {},\n\nYour order #{} has been confirmed!\n\n\
                     *Order Details:*\n{}\n\n*Total: ₹{}*\n\n\
                     Thank you for your order! We'll notify you when it ships.",
                    order.customer_name,
                    order.id,
                    lines,
                    format_amount(total)
                )
            }
        }
    }

    /// 渲染邮件：主题按事件固定，正文复用 WhatsApp 文本并去掉加粗标记
    pub fn email(&self, event: NotificationEvent, order: &Order, ctx: &EventContext) -> EmailContent {
        let brand = &self.brand_name;
        let id = &order.id;
        let subject = match event {
            NotificationEvent::OrderConfirmation => format!("{brand}: Order #{id} confirmed"),
            NotificationEvent::PaymentSuccess => format!("{brand}: Payment received for Order #{id}"),
            NotificationEvent::PaymentFailed => format!("{brand}: Payment unsuccessful for Order #{id}"),
            NotificationEvent::OrderShipped => format!("{brand}: Order #{id} has shipped"),
            NotificationEvent::OutForDelivery => format!("{brand}: Order #{id} is out for delivery"),
            NotificationEvent::OrderDelivered => format!("{brand}: Order #{id} was delivered"),
            NotificationEvent::RequestReview => format!("{brand}: How was Order #{id}?"),
            NotificationEvent::RefundConfirmation => format!("{brand}: Refund processed for Order #{id}"),
            NotificationEvent::ReorderReminder => format!("{brand}: Time to restock?"),
        };

        let rendered = self.whatsapp(event, order, ctx);
        let body = format!("{}\n\nThe {brand} Team", rendered.message.replace('*', ""));

        EmailContent { subject, body }
    }
}
