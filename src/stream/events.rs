//! 统一流事件类型
//!
//! 定义流式传输的中间表示 (Intermediate Representation)，
//! 用于解耦解析器 (parsers) 和生成器 (generators)。
//!
//! # 设计原则
//!
//! - `NotionStreamParser` 输出 `StreamEvent`
//! - `OpenAiSseGenerator` 与非流式收集器消费 `StreamEvent`
//! - 每次交换恰好产生一个终止事件（Done / NoContent / Timeout / Error）

use serde::{Deserialize, Serialize};

use crate::models::openai::Usage;

/// 超时提示文本
pub const TIMEOUT_MESSAGE: &str = "请求超时，未收到Notion响应。";

/// 上游无内容提示文本
pub const NO_CONTENT_MESSAGE: &str = "未从Notion收到内容响应,请更换ip重试。";

/// 错误提示文本
pub fn error_message(message: &str) -> String {
    format!("处理请求时出错: {}", message)
}

/// 统一流事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// 文本内容增量
    TextDelta {
        /// 文本内容
        text: String,
    },

    /// 推理内容增量
    ReasoningDelta {
        /// 推理文本
        text: String,
    },

    /// 使用量信息（终止前发出）
    Usage(TokenUsage),

    /// 上游正常结束但未产生任何内容
    NoContent,

    /// 首字节超时
    Timeout {
        /// 超时时间（毫秒）
        timeout_ms: u64,
    },

    /// 错误事件
    Error {
        /// 错误消息
        message: String,
        /// 错误发生前是否已经发出过内容
        content_sent: bool,
    },

    /// 正常完成
    Done,
}

impl StreamEvent {
    /// 是否为终止事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::NoContent
                | StreamEvent::Timeout { .. }
                | StreamEvent::Error { .. }
                | StreamEvent::Done
        )
    }

    /// 是否为内容增量
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            StreamEvent::TextDelta { .. } | StreamEvent::ReasoningDelta { .. }
        )
    }

    /// 终止事件对应的 finish_reason
    pub fn finish_reason(&self) -> Option<&'static str> {
        match self {
            StreamEvent::Done => Some("stop"),
            StreamEvent::NoContent => Some("no_content"),
            StreamEvent::Timeout { .. } => Some("timeout"),
            StreamEvent::Error { .. } => Some("error"),
            _ => None,
        }
    }

    /// 终止事件在内容为空时需要展示的说明文本
    pub fn explanation(&self) -> Option<String> {
        match self {
            StreamEvent::NoContent => Some(NO_CONTENT_MESSAGE.to_string()),
            StreamEvent::Timeout { .. } => Some(TIMEOUT_MESSAGE.to_string()),
            StreamEvent::Error {
                message,
                content_sent: false,
            } => Some(error_message(message)),
            _ => None,
        }
    }
}

/// 内容通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Text,
    Reasoning,
}

/// Token 使用量快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached_tokens_read: Option<u32>,
    pub cached_tokens_created: Option<u32>,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// 转换为 OpenAI usage
    pub fn to_openai(&self) -> Usage {
        Usage {
            prompt_tokens: self.input_tokens,
            completion_tokens: self.output_tokens,
            total_tokens: self.total(),
            cached_tokens_read: self.cached_tokens_read,
            cached_tokens_created: self.cached_tokens_created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::NoContent.is_terminal());
        assert!(StreamEvent::Timeout { timeout_ms: 1 }.is_terminal());
        assert!(!StreamEvent::TextDelta { text: "a".into() }.is_terminal());
        assert!(!StreamEvent::Usage(TokenUsage::default()).is_terminal());
    }

    #[test]
    fn test_finish_reasons() {
        assert_eq!(StreamEvent::Done.finish_reason(), Some("stop"));
        assert_eq!(StreamEvent::NoContent.finish_reason(), Some("no_content"));
        assert_eq!(
            StreamEvent::Timeout { timeout_ms: 1 }.finish_reason(),
            Some("timeout")
        );
        assert_eq!(
            StreamEvent::ReasoningDelta { text: "x".into() }.finish_reason(),
            None
        );
    }

    #[test]
    fn test_error_explanation_only_without_content() {
        let before = StreamEvent::Error {
            message: "boom".into(),
            content_sent: false,
        };
        assert_eq!(before.explanation().unwrap(), "处理请求时出错: boom");

        let after = StreamEvent::Error {
            message: "boom".into(),
            content_sent: true,
        };
        assert!(after.explanation().is_none());
        assert!(StreamEvent::Done.explanation().is_none());
    }

    #[test]
    fn test_usage_conversion() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens_read: Some(3),
            cached_tokens_created: None,
        };
        let openai = usage.to_openai();
        assert_eq!(openai.total_tokens, 15);
        assert_eq!(openai.cached_tokens_read, Some(3));
    }
}
