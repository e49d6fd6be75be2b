//! NotionCast
//!
//! 以 OpenAI Chat Completions 协议对外提供服务，内部驱动 Notion AI 会话。
//! 多个 Notion 账号组成会话池轮询使用，认证失败时自动切换。

pub mod config;
pub mod converter;
pub mod credential;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod proxy;
pub mod resilience;
pub mod server;
pub mod services;
pub mod stream;
pub mod translator;

pub use config::Config;
pub use error::RelayError;
