//! 模型列表

use axum::{response::IntoResponse, Json};

use crate::converter::create_model_list;

pub async fn list_models() -> impl IntoResponse {
    tracing::debug!("[HTTP] GET /v1/models");
    Json(create_model_list())
}
