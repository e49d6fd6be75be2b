//! 响应格式转换
//!
//! 流式响应由 `stream` 模块逐帧生成；这里只处理非流式的完整回复。

pub mod notion_to_openai;

pub use notion_to_openai::{create_model_list, create_openai_response};
