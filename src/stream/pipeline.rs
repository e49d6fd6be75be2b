//! 统一流处理管道
//!
//! 封装完整的流式处理流程：上游字节流 → 解析 → `StreamEvent` → 前端 SSE
//!
//! # 使用示例
//!
//! ```ignore
//! use notioncast_lib::stream::pipeline::{create_sse_stream, decode_stream, supervise};
//!
//! let events = decode_stream(outcome.response.body, outcome.deadline, thread_id);
//! let events = supervise(events, outcome.lease);
//! let sse = create_sse_stream(events, OpenAiSseGenerator::new(model));
//! ```

use std::convert::Infallible;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::credential::SessionLease;
use crate::providers::ByteStream;
use crate::resilience::FirstByteDeadline;
use crate::stream::events::StreamEvent;
use crate::stream::generators::OpenAiSseGenerator;
use crate::stream::parsers::NotionStreamParser;
use crate::translator::traits::SseResponseTranslator;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// SSE 开头的注释帧，让客户端尽早收到响应头
pub const SSE_PREAMBLE: &str = ":\n\n";

/// 解码上游响应体
///
/// 第一个数据块必须在 `deadline` 之前到达，否则产生 `Timeout` 终止事件。
/// 产生的事件序列恰好以一个终止事件结束。
pub fn decode_stream(
    body: ByteStream,
    deadline: FirstByteDeadline,
    known_thread_id: Option<String>,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut body = body;
        let mut parser = NotionStreamParser::new();

        let first = match deadline.guard(body.next()).await {
            Ok(first) => first,
            Err(e) => {
                tracing::warn!("[STREAM] {}", e);
                yield StreamEvent::Timeout { timeout_ms: deadline.timeout_ms() };
                return;
            }
        };

        let mut next = first;
        loop {
            match next {
                Some(Ok(bytes)) => {
                    for event in parser.process(&bytes) {
                        yield event;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!("[STREAM] 读取上游响应失败: {}", e);
                    yield parser.fail(e.to_string());
                    return;
                }
                None => break,
            }
            next = body.next().await;
        }

        for event in parser.finish(known_thread_id.as_deref()) {
            yield event;
        }
    }
}

/// 在后台任务中驱动事件流并维护会话租约
///
/// - 终止事件：完成租约（记入交换次数），`NoContent` 额外记录空响应
/// - 返回的流被丢弃（客户端断开）：取消后台任务并丢弃上游响应体，租约不计数
pub fn supervise<S>(events: S, lease: SessionLease) -> BoxStream<'static, StreamEvent>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut events = std::pin::pin!(events);
        let mut lease = Some(lease);

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("[STREAM] 客户端已断开，停止读取上游响应");
                    break;
                }
                event = events.next() => event,
            };
            let Some(event) = event else { break };

            let terminal = event.is_terminal();
            if terminal {
                if let Some(lease) = lease.take() {
                    if event == StreamEvent::NoContent {
                        lease.record_empty_response();
                    }
                    tracing::debug!(
                        "[STREAM] 交换结束 ({}), 用户: {}",
                        event.finish_reason().unwrap_or("stop"),
                        lease.user_id()
                    );
                    lease.complete();
                }
            }

            if tx.send(event).await.is_err() || terminal {
                break;
            }
        }
    });

    Box::pin(async_stream::stream! {
        let _guard = cancel.drop_guard();
        while let Some(event) = rx.recv().await {
            yield event;
        }
    })
}

/// 把事件流转换为 OpenAI SSE 文本流
///
/// 以 `:` 注释帧开始，总是以 `data: [DONE]` 结束。
pub fn create_sse_stream<S>(
    events: S,
    generator: OpenAiSseGenerator,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    async_stream::stream! {
        let mut generator = generator;
        let mut events = std::pin::pin!(events);

        yield Ok(SSE_PREAMBLE.to_string());

        while let Some(event) = events.next().await {
            for frame in generator.translate_to_sse(&event) {
                yield Ok(frame);
            }
            if generator.is_finished() {
                break;
            }
        }

        for frame in generator.finalize_sse() {
            yield Ok(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Session, SessionPool};
    use crate::error::RelayError;
    use crate::resilience::TimeoutConfig;
    use crate::stream::events::NO_CONTENT_MESSAGE;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    const THREAD: &str = "7d1e2f3a-0b4c-4d5e-8f90-a1b2c3d4e5f6";

    fn body(chunks: Vec<&'static str>) -> ByteStream {
        Box::pin(futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, RelayError>(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        ))
    }

    fn pool(n: usize) -> Arc<SessionPool> {
        let sessions = (0..n)
            .map(|i| Session {
                cookie: format!("token_v2=c{}", i),
                user_id: format!("user-{}", i),
                space_id: "space".into(),
                proxy_url: None,
            })
            .collect();
        Arc::new(SessionPool::new(sessions).unwrap())
    }

    #[tokio::test]
    async fn test_decode_new_conversation() {
        let body = body(vec![
            "{\"type\":\"agent-inference\",\"threadId\":\"",
            "7d1e2f3a-0b4c-4d5e-8f90-a1b2c3d4e5f6\",\"value\":[{\"type\":\"text\",\"content\":\"Hel\"}]}\n",
            "{\"type\":\"agent-inference\",\"value\":[{\"type\":\"text\",\"content\":\"Hello!\"}],\"inputTokens\":5,\"outputTokens\":2}\n",
        ]);
        let events: Vec<StreamEvent> = decode_stream(body, FirstByteDeadline::unbounded(), None)
            .collect()
            .await;

        assert_eq!(
            events[0],
            StreamEvent::TextDelta {
                text: "Hel".into()
            }
        );
        assert_eq!(
            events[1],
            StreamEvent::TextDelta {
                text: "lo!".into()
            }
        );
        assert_eq!(
            events[2],
            StreamEvent::TextDelta {
                text: format!("\n\n<!-- tid:{} -->", THREAD)
            }
        );
        assert!(matches!(&events[3], StreamEvent::Usage(u) if u.input_tokens == 5));
        assert_eq!(events[4], StreamEvent::Done);
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_decode_transport_error() {
        let body: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(
                b"{\"type\":\"markdown-chat\",\"value\":\"part\"}\n",
            )),
            Err(RelayError::UpstreamTransport("reset".into())),
        ]));
        let events: Vec<StreamEvent> = decode_stream(body, FirstByteDeadline::unbounded(), None)
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            StreamEvent::Error { content_sent: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_first_byte_timeout() {
        let body: ByteStream = Box::pin(futures::stream::pending());
        let deadline = TimeoutConfig::new(100, 0).start_first_byte();
        let events: Vec<StreamEvent> = decode_stream(body, deadline, None).collect().await;
        assert_eq!(events, vec![StreamEvent::Timeout { timeout_ms: 100 }]);
    }

    #[tokio::test]
    async fn test_supervise_completes_lease() {
        let pool = pool(2);
        let lease = pool.lease().unwrap();
        let body = body(vec!["{\"type\":\"markdown-chat\",\"value\":\"hi\"}\n"]);
        let events: Vec<StreamEvent> =
            supervise(decode_stream(body, FirstByteDeadline::unbounded(), None), lease)
                .collect()
                .await;
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(pool.status().sessions[0].stats.exchanges, 1);
    }

    #[tokio::test]
    async fn test_supervise_records_empty_response() {
        let pool = pool(2);
        let lease = pool.lease().unwrap();
        let events: Vec<StreamEvent> = supervise(
            decode_stream(body(vec![]), FirstByteDeadline::unbounded(), None),
            lease,
        )
        .collect()
        .await;
        assert_eq!(events, vec![StreamEvent::NoContent]);
        let status = pool.status();
        assert_eq!(status.sessions[0].stats.empty_responses, 1);
        assert_eq!(status.sessions[0].stats.exchanges, 1);
    }

    /// 上游响应体被丢弃时置位
    struct DropFlag(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_client_disconnect_cancels_upstream() {
        let pool = pool(2);
        let lease = pool.lease().unwrap();
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());

        let upstream = async_stream::stream! {
            let _flag = flag;
            yield Ok::<_, RelayError>(Bytes::from_static(b"{\"type\":\"markdown-chat\",\"value\":\"a\"}\n"));
            futures::future::pending::<()>().await;
        };
        let body: ByteStream = Box::pin(upstream);

        let mut events = supervise(decode_stream(body, FirstByteDeadline::unbounded(), None), lease);
        assert_eq!(
            events.next().await,
            Some(StreamEvent::TextDelta { text: "a".into() })
        );
        drop(events);

        for _ in 0..50 {
            if dropped.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
        // 断开的交换不计数
        assert_eq!(pool.status().sessions[0].stats.exchanges, 0);
    }

    #[tokio::test]
    async fn test_sse_stream_framing() {
        let events = futures::stream::iter(vec![StreamEvent::NoContent]);
        let frames: Vec<String> = create_sse_stream(events, OpenAiSseGenerator::default())
            .map(|f| match f {
                Ok(frame) => frame,
                Err(never) => match never {},
            })
            .collect()
            .await;
        assert_eq!(frames[0], SSE_PREAMBLE);
        assert!(frames[1].contains(NO_CONTENT_MESSAGE));
        assert_eq!(frames.last().map(String::as_str), Some("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_sse_stream_without_terminal() {
        let events = futures::stream::iter(vec![StreamEvent::TextDelta {
            text: "partial".into(),
        }]);
        let frames: Vec<String> = create_sse_stream(events, OpenAiSseGenerator::default())
            .filter_map(|f| async move { f.ok() })
            .collect()
            .await;
        assert!(frames.iter().any(|f| f.contains("\"finish_reason\":\"error\"")));
        assert_eq!(frames.last().map(String::as_str), Some("data: [DONE]\n\n"));
    }
}
