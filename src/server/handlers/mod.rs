//! HTTP 请求处理器

pub mod chat;
pub mod models;
pub mod status;

pub use chat::chat_completions;
pub use models::list_models;
pub use status::{cookies_status, health};
