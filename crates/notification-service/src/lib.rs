//! 订单通知服务
//!
//! 把订单业务事件转换为 WhatsApp 与邮件消息，经由 HTTP 网关发送，
//! 并把每次发送尝试记录为审计活动。渠道发送器从不因预期内的失败返回错误，
//! 而是返回 `SendResult`；活动记录失败不影响发送结果。

pub mod activity;
pub mod app;
pub mod cli;
pub mod email;
pub mod error;
pub mod media;
pub mod notifier;
pub mod phone;
pub mod sender;
pub mod status;
pub mod templates;
pub mod whatsapp;

pub use notifier::{EmailNotifier, OrderNotifier};
pub use sender::SendResult;
pub use templates::{EventContext, NotificationEvent};
