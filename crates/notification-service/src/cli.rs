//! `crm-notify` 命令行
//!
//! 每个子命令执行一次操作，把结果以 JSON 打印到标准输出。

use anyhow::Result;
use clap::{Parser, Subcommand};
use crm_document_store::orders::DEFAULT_ORDER_LIMIT;
use crm_shared::models::{NewOrder, NotificationChannel, OrderItem, OrderStatus, PaymentStatus};
use serde::Serialize;

use crate::app::App;
use crate::media::MediaKind;
use crate::templates::{EventContext, NotificationEvent};

#[derive(Parser, Debug)]
#[command(name = "crm-notify")]
#[command(version, about = "CRM 订单通知工具")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 检查 WhatsApp 与邮件网关的连接状态
    Status,
    /// 发送自由文本 WhatsApp 消息
    SendText {
        #[arg(long)]
        to: String,
        #[arg(long)]
        message: String,
        /// 活动记录关联的订单号
        #[arg(long, default_value = "")]
        order_id: String,
    },
    /// 发送图片、视频或文档
    SendMedia {
        #[arg(long)]
        kind: MediaKind,
        #[arg(long)]
        to: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        caption: Option<String>,
        #[arg(long)]
        filename: Option<String>,
        #[arg(long, default_value = "")]
        order_id: String,
    },
    /// 为订单发送业务事件通知
    Notify {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        event: NotificationEvent,
        #[arg(long, default_value = "whatsapp", value_parser = parse_channel)]
        channel: NotificationChannel,
        #[arg(long)]
        link: Option<String>,
        #[arg(long)]
        carrier: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        days: Option<u32>,
    },
    /// 创建订单
    CreateOrder {
        #[arg(long)]
        customer_name: String,
        #[arg(long)]
        customer_email: String,
        #[arg(long, default_value = "")]
        customer_phone: String,
        /// 行项目 `名称:单价[:数量[:商品ID]]`，可重复
        #[arg(long = "item", value_parser = parse_item)]
        items: Vec<OrderItem>,
        #[arg(long, default_value_t = 0.0)]
        shipping_cost: f64,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, default_value = "pending", value_parser = parse_order_status)]
        status: OrderStatus,
        #[arg(long, default_value = "pending", value_parser = parse_payment_status)]
        payment_status: PaymentStatus,
        /// 创建后发送下单确认
        #[arg(long)]
        notify: bool,
    },
    /// 更新订单状态并发送对应通知
    Transition {
        #[arg(long)]
        order_id: String,
        #[arg(long, value_parser = parse_order_status)]
        status: OrderStatus,
        #[arg(long)]
        link: Option<String>,
    },
    /// 更新支付状态并发送对应通知
    Payment {
        #[arg(long)]
        order_id: String,
        #[arg(long, value_parser = parse_payment_status)]
        status: PaymentStatus,
        /// 支付失败时的重试链接
        #[arg(long)]
        link: Option<String>,
    },
    /// 登记物流信息并标记发货
    Ship {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        tracking_code: String,
        #[arg(long, default_value = "")]
        tracking_url: String,
        #[arg(long)]
        carrier: Option<String>,
    },
    /// 列出最近的订单
    Orders {
        #[arg(long, default_value_t = DEFAULT_ORDER_LIMIT)]
        limit: u32,
    },
    /// 查看订单的通知活动记录
    Activities {
        #[arg(long)]
        order_id: String,
        /// 不指定时同时列出两个渠道
        #[arg(long, value_parser = parse_channel)]
        channel: Option<NotificationChannel>,
    },
    /// 计算看板指标
    Dashboard,
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase().replace('-', "_")
}

fn parse_channel(raw: &str) -> Result<NotificationChannel, String> {
    match normalize(raw).as_str() {
        "whatsapp" => Ok(NotificationChannel::WhatsApp),
        "email" => Ok(NotificationChannel::Email),
        other => Err(format!("未知的通知渠道: {other}")),
    }
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, String> {
    normalize(raw).parse()
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, String> {
    normalize(raw).parse()
}

fn parse_item(raw: &str) -> Result<OrderItem, String> {
    let mut parts = raw.split(':').map(str::trim);
    let name = parts
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| format!("行项目缺少名称: {raw}"))?;
    let price = parts
        .next()
        .ok_or_else(|| format!("行项目缺少单价: {raw}"))?
        .parse::<f64>()
        .map_err(|e| format!("无效的单价: {e}"))?;
    let quantity = match parts.next() {
        Some(quantity) => quantity.parse::<u32>().map_err(|e| format!("无效的数量: {e}"))?,
        None => 1,
    };
    let product_id = parts.next().filter(|id| !id.is_empty()).map(str::to_string);

    Ok(OrderItem {
        product_id,
        name: name.to_string(),
        price,
        quantity,
        total: None,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// 执行一条命令
pub async fn run(command: Command, app: &App) -> Result<()> {
    match command {
        Command::Status => print_json(&app.gateway_statuses().await),
        Command::SendText { to, message, order_id } => {
            print_json(&app.order_notifier().send_custom_text(&order_id, &to, &message).await)
        }
        Command::SendMedia {
            kind,
            to,
            url,
            caption,
            filename,
            order_id,
        } => print_json(
            &app.order_notifier()
                .send_media(&order_id, &to, kind, &url, caption, filename)
                .await,
        ),
        Command::Notify {
            order_id,
            event,
            channel,
            link,
            carrier,
            amount,
            days,
        } => {
            let ctx = EventContext {
                link,
                carrier,
                amount,
                days,
            };
            print_json(&app.notify_order(&order_id, event, &ctx, channel).await?)
        }
        Command::CreateOrder {
            customer_name,
            customer_email,
            customer_phone,
            items,
            shipping_cost,
            address,
            notes,
            status,
            payment_status,
            notify,
        } => {
            let new_order = NewOrder {
                customer_name,
                customer_email,
                customer_phone,
                status,
                payment_status,
                items,
                shipping_cost,
                shipping_address_text: address,
                notes,
            };
            print_json(&app.create_order(&new_order, notify).await?)
        }
        Command::Transition { order_id, status, link } => {
            let ctx = EventContext {
                link,
                ..Default::default()
            };
            print_json(&app.transition_order(&order_id, status, &ctx).await?)
        }
        Command::Payment { order_id, status, link } => {
            let ctx = EventContext {
                link,
                ..Default::default()
            };
            print_json(&app.update_payment(&order_id, status, &ctx).await?)
        }
        Command::Ship {
            order_id,
            tracking_code,
            tracking_url,
            carrier,
        } => print_json(
            &app.ship_order(&order_id, &tracking_code, &tracking_url, carrier)
                .await?,
        ),
        Command::Orders { limit } => print_json(&app.orders().list_recent(limit).await?),
        Command::Activities { order_id, channel } => {
            let channels = match channel {
                Some(channel) => vec![channel],
                None => vec![NotificationChannel::WhatsApp, NotificationChannel::Email],
            };
            let mut activities = Vec::new();
            for channel in channels {
                activities.extend(app.activities(channel, &order_id).await?);
            }
            activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            print_json(&activities)
        }
        Command::Dashboard => print_json(&app.dashboard().await?),
    }
}
