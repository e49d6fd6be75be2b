//! 聊天补全服务
//!
//! 一次交换的流程：
//! 1. 从历史中提取续接令牌，决定新建还是续接 thread
//! 2. 故障转移控制器租用会话，以该会话身份构建并发送请求（401 时换会话重建）
//! 3. 在后台任务中解码上游 NDJSON，终止事件时完成会话租约
//! 4. 流式请求把事件交给 SSE 生成器，非流式请求收集为完整回复

use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::StreamExt;

use crate::converter::create_openai_response;
use crate::credential::SessionPool;
use crate::error::RelayError;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};
use crate::providers::NotionTransport;
use crate::resilience::{FailoverController, TimeoutConfig};
use crate::stream::{collect_events, decode_stream, supervise, StreamEvent};
use crate::translator::notion::continuity;
use crate::translator::NotionRequestTranslator;

/// 一次已经拿到上游响应的交换
pub struct ChatExchange {
    /// 实际使用的模型
    pub model: String,
    /// 续接的 thread id；新会话为 None
    pub thread_id: Option<String>,
    /// 上游尝试次数
    pub attempts: u32,
    /// 事件流，恰好以一个终止事件结束
    pub events: BoxStream<'static, StreamEvent>,
}

impl std::fmt::Debug for ChatExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatExchange")
            .field("model", &self.model)
            .field("thread_id", &self.thread_id)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// 聊天补全服务
pub struct ChatService {
    pool: Arc<SessionPool>,
    transport: Arc<dyn NotionTransport>,
    translator: NotionRequestTranslator,
    failover: FailoverController,
}

impl ChatService {
    pub fn new(
        pool: Arc<SessionPool>,
        transport: Arc<dyn NotionTransport>,
        translator: NotionRequestTranslator,
    ) -> Self {
        let failover = FailoverController::new(Arc::clone(&pool), TimeoutConfig::default());
        Self {
            pool,
            transport,
            translator,
            failover,
        }
    }

    /// 设置超时配置
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.failover = FailoverController::new(Arc::clone(&self.pool), timeouts);
        self
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn translator(&self) -> &NotionRequestTranslator {
        &self.translator
    }

    /// 开始一次交换，返回上游响应解码后的事件流
    pub async fn start(&self, request: &ChatCompletionRequest) -> Result<ChatExchange, RelayError> {
        if request.messages.is_empty() {
            return Err(RelayError::InvalidRequest("messages 不能为空".to_string()));
        }

        let thread_id = continuity::extract(&request.messages);
        let model = self.translator.resolve_model(request);
        match &thread_id {
            Some(id) => tracing::info!("[CHAT] 续接 thread {}，模型: {}", id, model),
            None => tracing::info!(
                "[CHAT] 新会话，{} 条消息，模型: {}",
                request.messages.len(),
                model
            ),
        }

        let outcome = self
            .failover
            .execute(|session| {
                let built = self
                    .translator
                    .build(request, Some(session.as_ref()), thread_id.as_deref());
                let transport = Arc::clone(&self.transport);
                async move {
                    let built = built.map_err(RelayError::from)?;
                    tracing::debug!(
                        "[CHAT] 发送 transcript: {} 条, 用户: {}",
                        built.body.transcript.len(),
                        session.user_id
                    );
                    transport.send(&session, &built.body).await
                }
            })
            .await?;

        let events = decode_stream(outcome.response.body, outcome.deadline, thread_id.clone());
        Ok(ChatExchange {
            model,
            thread_id,
            attempts: outcome.attempts,
            events: supervise(events, outcome.lease),
        })
    }

    /// 流式交换
    ///
    /// 上游超时与上游调用失败以终止事件的形式出现在流中；
    /// 会话耗尽、无效请求等错误在发出响应头之前返回。
    pub async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<(String, BoxStream<'static, StreamEvent>), RelayError> {
        match self.start(request).await {
            Ok(exchange) => Ok((exchange.model, exchange.events)),
            Err(e) => {
                let event = terminal_event(&e).ok_or(e)?;
                let model = self.translator.resolve_model(request);
                Ok((model, stream::iter(vec![event]).boxed()))
            }
        }
    }

    /// 非流式交换
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, RelayError> {
        let (model, events) = match self.start(request).await {
            Ok(exchange) => (exchange.model, exchange.events),
            Err(RelayError::UpstreamTimeout { timeout_ms }) => (
                self.translator.resolve_model(request),
                stream::iter(vec![StreamEvent::Timeout { timeout_ms }]).boxed(),
            ),
            Err(e) => return Err(e),
        };

        let collected = collect_events(events).await;
        Ok(create_openai_response(&collected, &model))
    }
}

/// 流式请求中以终止事件呈现的错误
fn terminal_event(error: &RelayError) -> Option<StreamEvent> {
    match error {
        RelayError::UpstreamTimeout { timeout_ms } => Some(StreamEvent::Timeout {
            timeout_ms: *timeout_ms,
        }),
        e if e.is_upstream_failure() => Some(StreamEvent::Error {
            message: e.to_string(),
            content_sent: false,
        }),
        _ => None,
    }
}
