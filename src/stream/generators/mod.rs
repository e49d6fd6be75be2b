//! SSE 流生成器
//!
//! 将统一的 `StreamEvent` 转换为前端协议的 SSE 格式。
//!
//! # 支持的格式
//!
//! - OpenAI SSE (data: {...})

pub mod openai_sse;

pub use openai_sse::OpenAiSseGenerator;
