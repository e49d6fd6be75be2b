//! 会话池管理模块
//!
//! 提供 Notion 凭证加载、身份解析、轮询选择与失效管理

mod loader;
mod pool;
mod types;

pub use loader::{parse_file_content, parse_inline, CredentialSource};
pub use pool::{PoolError, SessionLease, SessionPool};
pub use types::{
    cookie_header_value, CredentialEntry, Identity, PoolStatus, Session, SessionStats,
    SessionView,
};
