//! CRM 通知端到端测试
//!
//! 在进程内启动模拟文档存储与模拟消息网关，驱动完整流程：
//! - 订单状态推进与业务通知
//! - 单飞管理员会话
//! - 网关连接状态检查

pub mod helpers;
pub mod suites;

pub use helpers::TestEnvironment;
