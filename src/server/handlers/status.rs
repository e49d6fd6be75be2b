//! 健康检查与会话池状态

use axum::{extract::State, response::IntoResponse, Json};

use crate::server::AppState;

/// 健康检查（无需认证）
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "initialized": true,
        "valid_cookies": state.service.pool().valid_count(),
    }))
}

/// 会话池状态
pub async fn cookies_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.service.pool().status();
    Json(serde_json::json!({
        "total_cookies": status.valid,
        "cookies": status,
    }))
}
