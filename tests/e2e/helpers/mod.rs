//! 测试辅助工具

mod environment;

pub use environment::{AUTH_PATH, TestEnvironment, order_json, test_config};
