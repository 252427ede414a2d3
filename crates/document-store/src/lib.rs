//! 文档存储客户端
//!
//! 封装对 PocketBase 的访问：单飞（single-flight）管理员会话、通用记录读写、
//! 订单查询与状态更新、通知活动审计记录，以及基于订单计算的看板指标。

pub mod activities;
pub mod client;
pub mod dashboard;
pub mod orders;
pub mod session;

pub use activities::ActivityStore;
pub use client::{ListQuery, ListResult, PocketBaseClient};
pub use session::{AdminSession, AuthError};
