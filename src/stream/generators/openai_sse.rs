//! OpenAI SSE 生成器
//!
//! 将 `StreamEvent` 转换为 OpenAI Chat Completions SSE 格式。
//!
//! # 格式说明
//!
//! OpenAI SSE 格式：
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"apple-danish","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"},"finish_reason":null}]}
//!
//! data: {"id":"chatcmpl-xxx",...,"choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{...}}
//!
//! data: [DONE]
//! ```
//!
//! 终止事件在尚未发出任何内容时会先补一段说明文本，保证客户端不会看到空回复。

use crate::models::openai::Usage;
use crate::stream::events::StreamEvent;
use crate::translator::traits::SseResponseTranslator;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// 流在没有终止事件的情况下结束时的错误说明
const UNTERMINATED_MESSAGE: &str = "上游流意外结束";

/// OpenAI SSE 生成器
#[derive(Debug)]
pub struct OpenAiSseGenerator {
    /// 响应 ID
    response_id: String,
    /// 模型名称
    model: String,
    /// 创建时间戳
    created: u64,
    /// 是否已发出 role
    role_sent: bool,
    /// 是否已发出过内容
    content_sent: bool,
    /// 最近一次的使用量
    usage: Option<Usage>,
    /// 是否已发出 [DONE]
    finished: bool,
}

impl Default for OpenAiSseGenerator {
    fn default() -> Self {
        Self::new("unknown".to_string())
    }
}

impl OpenAiSseGenerator {
    /// 创建新的生成器
    pub fn new(model: String) -> Self {
        Self::with_id(format!("chatcmpl-{}", uuid::Uuid::new_v4()), model)
    }

    /// 使用指定的响应 ID 创建生成器
    pub fn with_id(id: String, model: String) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            response_id: id,
            model,
            created,
            role_sent: false,
            content_sent: false,
            usage: None,
            finished: false,
        }
    }

    /// 获取响应 ID
    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    /// 是否已发出 [DONE]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn frame(
        &mut self,
        content: Option<&str>,
        reasoning_content: Option<&str>,
        finish_reason: Option<&str>,
        usage: Option<&Usage>,
    ) -> String {
        let role = if self.role_sent {
            None
        } else {
            self.role_sent = true;
            Some("assistant")
        };
        let chunk = OpenAiStreamChunk {
            id: &self.response_id,
            object: "chat.completion.chunk",
            created: self.created,
            model: &self.model,
            choices: vec![OpenAiChoice {
                index: 0,
                delta: OpenAiDelta {
                    role,
                    content,
                    reasoning_content,
                },
                finish_reason,
            }],
            usage,
        };
        // 结构体只含字符串与数字字段，序列化不会失败
        let json = serde_json::to_string(&chunk).unwrap_or_default();
        format!("data: {}\n\n", json)
    }

    fn terminate(&mut self, event: &StreamEvent) -> Vec<String> {
        let mut frames = Vec::with_capacity(3);
        if !self.content_sent {
            if let Some(text) = event.explanation() {
                frames.push(self.frame(Some(&text), None, None, None));
                self.content_sent = true;
            }
        }
        let usage = self.usage.take();
        let finish_reason = event.finish_reason().unwrap_or("stop");
        frames.push(self.frame(None, None, Some(finish_reason), usage.as_ref()));
        frames.push(DONE_FRAME.to_string());
        self.finished = true;
        frames
    }
}

impl SseResponseTranslator for OpenAiSseGenerator {
    fn translate_to_sse(&mut self, event: &StreamEvent) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        match event {
            StreamEvent::TextDelta { text } if !text.is_empty() => {
                self.content_sent = true;
                vec![self.frame(Some(text), None, None, None)]
            }
            StreamEvent::ReasoningDelta { text } if !text.is_empty() => {
                self.content_sent = true;
                vec![self.frame(None, Some(text), None, None)]
            }
            StreamEvent::TextDelta { .. } | StreamEvent::ReasoningDelta { .. } => Vec::new(),
            StreamEvent::Usage(usage) => {
                self.usage = Some(usage.to_openai());
                Vec::new()
            }
            terminal => self.terminate(terminal),
        }
    }

    fn finalize_sse(&mut self) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        tracing::warn!("[SSE] 流在终止事件之前结束");
        let event = StreamEvent::Error {
            message: UNTERMINATED_MESSAGE.to_string(),
            content_sent: self.content_sent,
        };
        self.terminate(&event)
    }
}

// ============================================================================
// OpenAI SSE 数据结构
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiStreamChunk<'a> {
    id: &'a str,
    object: &'a str,
    created: u64,
    model: &'a str,
    choices: Vec<OpenAiChoice<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a Usage>,
}

#[derive(Debug, Serialize)]
struct OpenAiChoice<'a> {
    index: usize,
    delta: OpenAiDelta<'a>,
    finish_reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OpenAiDelta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<&'a str>,
}
