//! 测试套件

mod gateway_status;
mod notification_flow;
mod session;
