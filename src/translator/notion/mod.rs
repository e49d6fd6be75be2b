//! Notion 后端请求转换
//!
//! - `request`: OpenAI 请求 → transcript 请求体
//! - `continuity`: 回复中的 thread id 标记

pub mod continuity;
pub mod request;

pub use request::{NotionRequest, NotionRequestTranslator, NOTION_MODELS};
