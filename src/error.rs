//! 中转错误类型
//!
//! 定义会话池、请求转换、上游调用过程中可能发生的错误，
//! 并负责把错误渲染为 OpenAI 风格的 JSON 错误响应。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::credential::PoolError;
use crate::translator::{TranslateError, TranslateErrorKind};

/// 中转错误
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// 凭证源没有产生任何会话（启动期致命错误）
    #[error("没有可用的 Notion 凭证")]
    NoCredentials,

    /// 所有会话均已失效
    #[error("所有 Notion 会话均已失效 (尝试 {attempts} 次)")]
    SessionExhausted { attempts: u32 },

    /// 请求转换时未提供会话
    #[error("请求转换时没有可用的会话")]
    NoSessionAvailable,

    /// 上游认证失败
    #[error("上游认证失败: {0}")]
    UpstreamAuth(String),

    /// 上游数据格式错误
    #[error("上游数据格式错误: {0}")]
    UpstreamProtocol(String),

    /// 上游首字节超时
    #[error("上游响应超时: {timeout_ms}ms 内未收到数据")]
    UpstreamTimeout { timeout_ms: u64 },

    /// 上游网络错误
    #[error("上游网络错误: {0}")]
    UpstreamTransport(String),

    /// 上游返回非成功状态
    #[error("上游返回错误状态 {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// 无效的客户端请求
    #[error("无效请求: {0}")]
    InvalidRequest(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

impl RelayError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::NoCredentials => 503,
            RelayError::SessionExhausted { .. } => 503,
            RelayError::NoSessionAvailable => 500,
            RelayError::UpstreamAuth(_) => 401,
            RelayError::UpstreamProtocol(_) => 502,
            RelayError::UpstreamTimeout { .. } => 504,
            RelayError::UpstreamTransport(_) => 502,
            RelayError::UpstreamStatus { .. } => 502,
            RelayError::InvalidRequest(_) => 400,
            RelayError::Config(_) => 500,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::NoCredentials | RelayError::SessionExhausted { .. } => {
                "service_unavailable"
            }
            RelayError::UpstreamAuth(_) => "authentication_error",
            RelayError::UpstreamTimeout { .. } => "timeout_error",
            RelayError::UpstreamProtocol(_)
            | RelayError::UpstreamTransport(_)
            | RelayError::UpstreamStatus { .. } => "upstream_error",
            RelayError::InvalidRequest(_) => "invalid_request_error",
            RelayError::NoSessionAvailable | RelayError::Config(_) => "server_error",
        }
    }

    /// 是否属于上游调用失败（流式请求中以终止事件的形式呈现）
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            RelayError::UpstreamProtocol(_)
                | RelayError::UpstreamTransport(_)
                | RelayError::UpstreamStatus { .. }
        )
    }

    /// 转换为 JSON 错误响应
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": self.status_code()
            }
        })
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

impl From<PoolError> for RelayError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::NoCredentials => RelayError::NoCredentials,
            PoolError::Exhausted => RelayError::SessionExhausted { attempts: 0 },
            other => RelayError::Config(other.to_string()),
        }
    }
}

impl From<TranslateError> for RelayError {
    fn from(err: TranslateError) -> Self {
        match err.kind {
            TranslateErrorKind::NoSession => RelayError::NoSessionAvailable,
            _ => RelayError::InvalidRequest(err.message),
        }
    }
}

impl From<ConfigError> for RelayError {
    fn from(err: ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}
