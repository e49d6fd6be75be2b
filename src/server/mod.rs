//! HTTP 服务
//!
//! 路由：
//! - `GET /health`：无需认证
//! - `GET /v1/models`、`POST /v1/chat/completions`、`GET /cookies/status`：Bearer 认证

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::middleware::{require_api_key, ApiKeyAuth};
use crate::services::ChatService;

/// 请求体上限
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub auth: Arc<ApiKeyAuth>,
}

impl AppState {
    pub fn new(service: ChatService, api_key: impl Into<String>) -> Self {
        Self {
            service: Arc::new(service),
            auth: Arc::new(ApiKeyAuth::new(api_key)),
        }
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/cookies/status", get(handlers::cookies_status))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// 启动服务，Ctrl-C 时优雅退出
pub async fn run(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[SERVER] 监听 http://{}", listener.local_addr()?);
    tracing::info!(
        "[SERVER] 有效会话: {}",
        state.service.pool().valid_count()
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("[SERVER] 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[SERVER] 无法监听 Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[SERVER] 收到退出信号");
}
