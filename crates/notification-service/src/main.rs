//! crm-notify：订单通知命令行入口

use anyhow::Result;
use clap::Parser;
use crm_shared::{config::AppConfig, observability};
use tracing::{info, warn};

use notification_service::app::App;
use notification_service::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在时忽略
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = AppConfig::load("crm-notify")?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(environment = %config.environment, "配置已加载");
    if !config.has_admin_credentials() {
        warn!("未配置文档存储管理员凭据，需要认证的操作将失败");
    }

    let app = App::from_config(config)?;
    cli::run(cli.command, &app).await
}
