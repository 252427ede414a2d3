//! 共享库
//!
//! 包含 CRM 各组件共用的配置、错误处理、重试策略、领域模型与可观测性基础设施。

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod retry;
pub mod test_utils;
