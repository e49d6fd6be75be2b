//! 协议转换器 Trait 与错误定义
//!
//! - `SseResponseTranslator`: 将 `StreamEvent` 转换为前端 SSE 帧
//! - `TranslateError`: OpenAI 请求转换为 Notion transcript 时的错误

use thiserror::Error;

use crate::stream::StreamEvent;

/// SSE 响应转换器 Trait
///
/// 专门用于将 `StreamEvent` 转换为 SSE 字符串格式。
pub trait SseResponseTranslator {
    /// 将流事件转换为 SSE 字符串
    ///
    /// # 返回
    ///
    /// SSE 格式的字符串列表，每个字符串都是完整的 SSE 事件
    fn translate_to_sse(&mut self, event: &StreamEvent) -> Vec<String>;

    /// 生成结束 SSE 事件（流在没有终止事件的情况下结束时使用）
    fn finalize_sse(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// 转换错误类型
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct TranslateError {
    /// 错误类型
    pub kind: TranslateErrorKind,
    /// 错误消息
    pub message: String,
}

/// 转换错误类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateErrorKind {
    /// 无效的请求格式
    InvalidRequest,
    /// 未提供会话
    NoSession,
}

impl std::fmt::Display for TranslateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "InvalidRequest"),
            Self::NoSession => write!(f, "NoSession"),
        }
    }
}

impl TranslateError {
    /// 创建新的转换错误
    pub fn new(kind: TranslateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 创建无效请求错误
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TranslateErrorKind::InvalidRequest, message)
    }

    /// 创建缺少会话错误
    pub fn no_session() -> Self {
        Self::new(
            TranslateErrorKind::NoSession,
            "No session supplied for transcript build",
        )
    }
}
