//! 聊天补全处理器
//!
//! - 请求体无法解析或 `messages` 为空：400
//! - 没有有效会话：503
//! - `stream: true`：SSE 响应，否则返回完整 JSON

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::error::RelayError;
use crate::models::openai::ChatCompletionRequest;
use crate::server::AppState;
use crate::stream::{create_sse_stream, OpenAiSseGenerator};

pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("[HTTP] 无法解析请求体: {}", rejection.body_text());
            return RelayError::InvalidRequest(rejection.body_text()).into_response();
        }
    };

    if request.messages.is_empty() {
        return RelayError::InvalidRequest("messages 不能为空".to_string()).into_response();
    }

    if state.service.pool().valid_count() == 0 {
        tracing::error!("[HTTP] 没有有效的 Notion 会话");
        return RelayError::SessionExhausted { attempts: 0 }.into_response();
    }

    if request.stream {
        return match state.service.stream(&request).await {
            Ok((model, events)) => sse_response(create_sse_stream(
                events,
                OpenAiSseGenerator::new(model),
            )),
            Err(e) => e.into_response(),
        };
    }

    match state.service.complete(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

fn sse_response<S>(stream: S) -> Response
where
    S: futures::Stream<Item = Result<String, std::convert::Infallible>> + Send + 'static,
{
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": {"message": "Failed to build stream response"}})),
            )
                .into_response()
        })
}
