//! Notion NDJSON 流解析器
//!
//! 将 runInferenceTranscript 的 NDJSON 记录解码为 `StreamEvent`。
//!
//! 两种记录格式走同一条解码路径：
//! - `agent-inference`: `value` 为 `[{type: text|thinking, content}]`，每项是该通道的累计内容
//! - `markdown-chat`: 旧格式，`value` 为整体替换的文本，按文本通道的累计内容处理
//!
//! 每个通道记录已发出的字节长度，只有新的累计内容更长时才发出超出部分，
//! 乱序或重复的记录不会产生事件。

use crate::models::notion::{AgentInferenceRecord, InferenceValue, NotionEnvelope};
use crate::stream::events::{Channel, StreamEvent, TokenUsage};
use crate::translator::notion::continuity;

use super::ndjson::LineBuffer;

/// Notion 流解析器
#[derive(Debug, Default)]
pub struct NotionStreamParser {
    lines: LineBuffer,
    /// 文本通道已发出的字节数
    text_len: usize,
    /// 推理通道已发出的字节数
    reasoning_len: usize,
    usage: Option<TokenUsage>,
    /// 新会话时从流中发现的 thread id
    discovered_thread_id: Option<String>,
    content_emitted: bool,
    records: usize,
    malformed: usize,
    finished: bool,
}

impl NotionStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一段原始字节，返回按记录顺序产生的事件
    pub fn process(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in self.lines.push(bytes) {
            events.extend(self.process_line(&line));
        }
        events
    }

    /// 处理一条完整的 NDJSON 行
    pub fn process_line(&mut self, line: &[u8]) -> Vec<StreamEvent> {
        let value: serde_json::Value = match serde_json::from_slice(line) {
            Ok(value) => value,
            Err(e) => {
                self.malformed += 1;
                tracing::warn!("[STREAM] 跳过无法解析的 NDJSON 行: {}", e);
                return Vec::new();
            }
        };
        self.records += 1;

        // recordMap 等没有 type 字段的记录
        if value.get("type").is_none() {
            return Vec::new();
        }

        let envelope: NotionEnvelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.malformed += 1;
                tracing::warn!("[STREAM] 跳过格式不符的记录: {}", e);
                return Vec::new();
            }
        };

        match envelope {
            NotionEnvelope::AgentInference(record) => self.apply_inference(record),
            NotionEnvelope::MarkdownChat(record) => self
                .apply_cumulative(Channel::Text, &record.value)
                .into_iter()
                .collect(),
            NotionEnvelope::Error(record) => {
                tracing::error!("[STREAM] Notion 返回错误记录: {}", record.describe());
                Vec::new()
            }
            NotionEnvelope::Unknown => Vec::new(),
        }
    }

    fn apply_inference(&mut self, record: AgentInferenceRecord) -> Vec<StreamEvent> {
        if self.discovered_thread_id.is_none() {
            self.discovered_thread_id = record.conversation_id().map(str::to_string);
        }

        if record.reports_usage() {
            self.usage = Some(TokenUsage {
                input_tokens: record.input_tokens.unwrap_or(0),
                output_tokens: record.output_tokens.unwrap_or(0),
                cached_tokens_read: record.cached_tokens_read,
                cached_tokens_created: record.cached_tokens_created,
            });
        }

        let mut events = Vec::new();
        for item in &record.value {
            let (channel, content) = match item {
                InferenceValue::Thinking {
                    content: Some(content),
                } => (Channel::Reasoning, content),
                InferenceValue::Text {
                    content: Some(content),
                } => (Channel::Text, content),
                _ => continue,
            };
            events.extend(self.apply_cumulative(channel, content));
        }
        events
    }

    /// 根据累计内容计算增量
    fn apply_cumulative(&mut self, channel: Channel, content: &str) -> Option<StreamEvent> {
        let emitted = match channel {
            Channel::Text => &mut self.text_len,
            Channel::Reasoning => &mut self.reasoning_len,
        };
        if content.len() <= *emitted {
            return None;
        }
        // 已发出长度不在字符边界上说明累计内容前缀发生了变化
        let Some(delta) = content.get(*emitted..) else {
            tracing::warn!("[STREAM] 累计内容与已发送内容不一致，跳过该记录");
            return None;
        };
        let delta = delta.to_string();
        *emitted = content.len();
        self.content_emitted = true;

        Some(match channel {
            Channel::Text => StreamEvent::TextDelta { text: delta },
            Channel::Reasoning => StreamEvent::ReasoningDelta { text: delta },
        })
    }

    /// 上游正常结束
    ///
    /// # 参数
    /// - `known_thread_id`: 续接请求已携带的 thread id
    ///
    /// # 返回
    /// - 未发出过内容: `[NoContent]`
    /// - 否则: `[TextDelta(续接标记)?, Usage?, Done]`
    pub fn finish(&mut self, known_thread_id: Option<&str>) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let dropped = self.lines.discard();
        if dropped > 0 {
            tracing::warn!("[STREAM] 丢弃未以换行结尾的 {} 字节", dropped);
        }

        tracing::info!(
            "[STREAM] 上游流结束: records={}, malformed={}, text={}B, reasoning={}B",
            self.records,
            self.malformed,
            self.text_len,
            self.reasoning_len
        );

        if !self.content_emitted {
            return vec![StreamEvent::NoContent];
        }

        let mut events = Vec::with_capacity(3);
        let thread_id = known_thread_id.or(self.discovered_thread_id.as_deref());
        match thread_id.and_then(continuity::thread_marker) {
            Some(marker) => {
                self.text_len += marker.len();
                events.push(StreamEvent::TextDelta { text: marker });
            }
            None => {
                if let Some(id) = thread_id {
                    tracing::warn!("[STREAM] thread id 格式无法嵌入: {}", id);
                }
            }
        }
        if let Some(usage) = &self.usage {
            events.push(StreamEvent::Usage(usage.clone()));
        }
        events.push(StreamEvent::Done);
        events
    }

    /// 上游传输失败
    pub fn fail(&mut self, message: impl Into<String>) -> StreamEvent {
        self.finished = true;
        StreamEvent::Error {
            message: message.into(),
            content_sent: self.content_emitted,
        }
    }

    pub fn has_content(&self) -> bool {
        self.content_emitted
    }

    pub fn discovered_thread_id(&self) -> Option<&str> {
        self.discovered_thread_id.as_deref()
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }
}
