//! 数据模型
//!
//! - `openai`: 客户端使用的 Chat Completions 协议
//! - `notion`: Notion transcript 请求与 NDJSON 响应记录

pub mod notion;
pub mod openai;
