//! API Key 认证
//!
//! 校验 `Authorization: Bearer <key>`，比较使用常量时间。

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

/// 认证失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Missing,
    Invalid,
}

impl AuthError {
    fn message(&self) -> &'static str {
        match self {
            AuthError::Missing => "Missing API key",
            AuthError::Invalid => "Invalid API key",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": {
                    "message": self.message(),
                    "type": "authentication_error"
                }
            })),
        )
            .into_response()
    }
}

/// API Key 校验器
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    /// 期望的 API Key
    expected_key: String,
}

impl ApiKeyAuth {
    pub fn new(expected_key: impl Into<String>) -> Self {
        Self {
            expected_key: expected_key.into(),
        }
    }

    /// 验证 API Key
    pub fn verify(&self, provided_key: Option<&str>) -> Result<(), AuthError> {
        match provided_key {
            Some(key) if key.as_bytes().ct_eq(self.expected_key.as_bytes()).into() => Ok(()),
            Some(_) => Err(AuthError::Invalid),
            None => Err(AuthError::Missing),
        }
    }

    /// 从请求头中取出 Bearer token
    pub fn bearer_token(request: &Request) -> Option<&str> {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    }
}

/// 认证中间件
pub async fn require_api_key(
    State(auth): State<Arc<ApiKeyAuth>>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = auth.verify(ApiKeyAuth::bearer_token(&request)) {
        tracing::warn!(
            "[AUTH] 拒绝请求 {} {}: {}",
            request.method(),
            request.uri().path(),
            e.message()
        );
        return e.into_response();
    }
    next.run(request).await
}
