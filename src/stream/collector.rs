//! 非流式响应收集
//!
//! 把事件流累积为一次完整的回复，供非流式请求使用。

use futures::{Stream, StreamExt};

use crate::stream::events::{StreamEvent, TokenUsage};

/// 收集到的完整回复
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedResponse {
    /// 文本通道（含续接标记）
    pub content: String,
    /// 推理通道
    pub reasoning: String,
    pub usage: Option<TokenUsage>,
    /// 终止事件对应的 finish_reason；流未正常终止时为 None
    pub finish_reason: Option<&'static str>,
}

impl CollectedResponse {
    /// 累积一个事件
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } => self.content.push_str(text),
            StreamEvent::ReasoningDelta { text } => self.reasoning.push_str(text),
            StreamEvent::Usage(usage) => self.usage = Some(usage.clone()),
            terminal => {
                if self.finish_reason.is_some() {
                    return;
                }
                if self.content.is_empty() {
                    if let Some(text) = terminal.explanation() {
                        self.content = text;
                    }
                }
                self.finish_reason = terminal.finish_reason();
            }
        }
    }

    /// 推理内容（为空时返回 None）
    pub fn reasoning_content(&self) -> Option<&str> {
        (!self.reasoning.is_empty()).then_some(self.reasoning.as_str())
    }
}

/// 消费事件流直到终止事件
pub async fn collect_events<S>(events: S) -> CollectedResponse
where
    S: Stream<Item = StreamEvent>,
{
    let mut events = std::pin::pin!(events);
    let mut collected = CollectedResponse::default();
    while let Some(event) = events.next().await {
        collected.apply(&event);
        if event.is_terminal() {
            break;
        }
    }
    if collected.finish_reason.is_none() {
        tracing::warn!("[STREAM] 事件流在终止事件之前结束");
        collected.apply(&StreamEvent::Error {
            message: "上游流意外结束".to_string(),
            content_sent: !collected.content.is_empty(),
        });
    }
    collected
}
