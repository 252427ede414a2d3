//! 领域模型
//!
//! 订单与通知审计记录的统一表示。订单由文档存储持有，本系统只读写；
//! 通知活动记录只追加、不修改，是每次发送尝试的审计轨迹。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CrmError;

// ---------------------------------------------------------------------------
// 订单
// ---------------------------------------------------------------------------

/// 订单履约状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    /// 文档存储里的空值或未知取值
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("未知的订单状态: {other}")),
        }
    }
}

/// 支付状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(format!("未知的支付状态: {other}")),
        }
    }
}

/// 订单行项目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.total.unwrap_or(self.price * self.quantity as f64)
    }
}

/// 订单记录
///
/// 字段名与文档存储中的 `orders` 集合保持一致，未识别的字段直接忽略。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: f64,
    pub shipping_cost: f64,
    pub tax: f64,
    pub discount: f64,
    pub total: f64,
    pub shipping_address_text: String,
    /// 行项目：可能是 JSON 编码的字符串，也可能已经是数组
    pub products: serde_json::Value,
    pub tracking_code: Option<String>,
    pub tracking_url: Option<String>,
    pub notes: Option<String>,
    #[serde(with = "pb_datetime")]
    pub created: Option<DateTime<Utc>>,
}

impl Order {
    /// 解析行项目；无法解码时返回空列表而不是报错
    pub fn line_items(&self) -> Vec<OrderItem> {
        match &self.products {
            serde_json::Value::String(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(raw).unwrap_or_default()
            }
            value @ serde_json::Value::Array(_) => {
                serde_json::from_value(value.clone()).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// 新建订单的输入
///
/// 小计按行项目的单价乘数量汇总，总额是小计加运费，金额保留两位小数。
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
    pub shipping_cost: f64,
    pub shipping_address_text: Option<String>,
    pub notes: Option<String>,
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn is_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), CrmError> {
        if self.customer_name.trim().is_empty() {
            return Err(CrmError::Validation("Customer name is required".to_string()));
        }
        let email = self.customer_email.trim();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'));
        if !valid_email {
            return Err(CrmError::Validation("Invalid email address".to_string()));
        }
        if !is_amount(self.shipping_cost) {
            return Err(CrmError::Validation("Shipping cost must be non-negative".to_string()));
        }
        for item in &self.items {
            if item.name.trim().is_empty() || !is_amount(item.price) || item.quantity == 0 {
                return Err(CrmError::Validation(format!("Invalid line item: {}", item.name)));
            }
        }
        Ok(())
    }

    pub fn subtotal(&self) -> f64 {
        round_cents(self.items.iter().map(|i| i.price * f64::from(i.quantity)).sum())
    }

    pub fn total(&self) -> f64 {
        round_cents(self.subtotal() + self.shipping_cost)
    }

    /// 写入 `orders` 集合的记录体，行项目编码为 JSON 字符串
    pub fn to_record(&self, created: DateTime<Utc>) -> Result<serde_json::Value, CrmError> {
        let items: Vec<OrderItem> = self
            .items
            .iter()
            .map(|item| OrderItem {
                total: Some(item.price * f64::from(item.quantity)),
                ..item.clone()
            })
            .collect();
        let total = self.total();

        Ok(serde_json::json!({
            "customer_name": self.customer_name.trim(),
            "customer_email": self.customer_email.trim(),
            "customer_phone": self.customer_phone.trim(),
            "status": self.status,
            "payment_status": self.payment_status,
            "products": serde_json::to_string(&items)?,
            "subtotal": self.subtotal(),
            "shipping_cost": round_cents(self.shipping_cost),
            "total": total,
            "totalAmount": total,
            "shipping_address_text": self.shipping_address_text,
            "notes": self.notes,
            "created": created.format("%Y-%m-%d %H:%M:%S%.3fZ").to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// 通知活动
// ---------------------------------------------------------------------------

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[serde(rename = "whatsapp")]
    WhatsApp,
    Email,
}

impl NotificationChannel {
    /// 渠道对应的审计集合
    pub fn collection(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp_activities",
            Self::Email => "email_activities",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Sent,
    Failed,
}

impl ActivityStatus {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Sent } else { Self::Failed }
    }
}

/// 通知活动记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 空订单号不写入存储，悬空引用被容忍
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub order_id: String,
    #[serde(skip, default = "default_channel")]
    pub channel: NotificationChannel,
    #[serde(default)]
    pub template_name: String,
    pub recipient: String,
    pub status: ActivityStatus,
    /// JSON 序列化后的消息内容与网关响应
    #[serde(default)]
    pub message_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(with = "pb_datetime::required")]
    pub timestamp: DateTime<Utc>,
}

fn default_channel() -> NotificationChannel {
    NotificationChannel::WhatsApp
}

impl NotificationActivity {
    pub fn new(
        channel: NotificationChannel,
        order_id: impl Into<String>,
        template_name: impl Into<String>,
        recipient: impl Into<String>,
        status: ActivityStatus,
        message_content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            order_id: order_id.into(),
            channel,
            template_name: template_name.into(),
            recipient: recipient.into(),
            status,
            message_content: message_content.into(),
            error_message: None,
            media_url: None,
            subject: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

// ---------------------------------------------------------------------------
// 文档存储时间格式
// ---------------------------------------------------------------------------

/// 文档存储的时间戳形如 `2024-05-01 10:20:30.123Z`，与 RFC 3339 只差日期和时间之间的空格
pub mod pb_datetime {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(&raw.replacen(' ', "T", 1))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub mod required {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &DateTime<Utc>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&value.to_rfc3339())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<DateTime<Utc>, D::Error> {
            let raw = String::deserialize(deserializer)?;
            parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("无效的时间戳: {raw}")))
        }
    }
}
