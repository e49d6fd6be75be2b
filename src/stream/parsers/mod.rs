//! 流式数据解析器
//!
//! 解析 Notion 的 NDJSON 响应流，输出统一的 `StreamEvent`。

pub mod ndjson;
pub mod notion;

pub use ndjson::LineBuffer;
pub use notion::NotionStreamParser;

#[cfg(test)]
mod tests;
