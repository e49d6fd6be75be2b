//! 流式处理层
//!
//! 提供统一的流式数据处理能力，包括：
//! - 事件类型定义 (events)
//! - 上游流格式解析 (parsers)
//! - 前端流格式生成 (generators)
//! - 非流式回复收集 (collector)
//!
//! # 架构设计
//!
//! ```text
//! Notion NDJSON ──> [NotionStreamParser] ──> StreamEvent ──> [OpenAiSseGenerator] ──> OpenAI SSE
//!                                                      └──> [collect_events] ──> chat.completion
//! ```
//!
//! # 模块结构
//!
//! - `events`: 统一的流事件类型定义 (`StreamEvent`)
//! - `parsers`: 上游流格式解析器
//!   - `ndjson`: 行缓冲
//!   - `notion`: 累计内容 → 增量事件
//! - `generators`: 前端流格式生成器
//!   - `openai_sse`: OpenAI SSE 格式生成器
//! - `pipeline`: 首字节超时、后台读取与取消、SSE 封装

pub mod collector;
pub mod events;
pub mod generators;
pub mod parsers;
pub mod pipeline;

// 重新导出核心类型
pub use collector::{collect_events, CollectedResponse};
pub use events::{Channel, StreamEvent, TokenUsage};
pub use generators::OpenAiSseGenerator;
pub use parsers::{LineBuffer, NotionStreamParser};
pub use pipeline::{create_sse_stream, decode_stream, supervise, SSE_PREAMBLE};
