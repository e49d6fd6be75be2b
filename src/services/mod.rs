//! 业务服务模块
//!
//! 组合会话池、请求转换、故障转移与流解码，完成一次聊天补全交换。

pub mod chat_service;

pub use chat_service::{ChatExchange, ChatService};
