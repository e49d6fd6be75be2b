//! NotionCast 入口
//!
//! 加载配置、初始化日志、解析凭证并启动 HTTP 服务。

use std::sync::Arc;

use anyhow::Context;

use notioncast_lib::credential::SessionPool;
use notioncast_lib::providers::NotionClient;
use notioncast_lib::resilience::TimeoutConfig;
use notioncast_lib::server::{self, AppState};
use notioncast_lib::services::ChatService;
use notioncast_lib::translator::NotionRequestTranslator;
use notioncast_lib::{logger, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("加载配置失败")?;
    logger::init(&config.logging);

    let notion = &config.notion;
    let client = Arc::new(NotionClient::new(notion).context("创建 HTTP 客户端失败")?);

    let source = notion.credential_source();
    tracing::info!("[MAIN] 凭证来源: {}", source.describe());
    let pool = SessionPool::initialize(&source, client.as_ref())
        .await
        .context("初始化会话池失败")?;

    let service = ChatService::new(
        Arc::new(pool),
        client,
        NotionRequestTranslator::new(&notion.default_model, &notion.timezone),
    )
    .with_timeouts(TimeoutConfig::new(
        notion.first_byte_timeout_secs.saturating_mul(1000),
        notion.request_timeout_secs.saturating_mul(1000),
    ));

    let state = AppState::new(service, config.server.api_key.clone());
    server::run(&config.server, state).await
}
