//! 上游 Provider 模块
//!
//! 定义会话核心依赖的传输与身份解析接口，以及基于 reqwest 的 Notion 实现

mod notion;
mod traits;

pub use notion::{parse_spaces_identity, NotionClient};
pub use traits::{ByteStream, IdentityResolver, NotionTransport, UpstreamResponse};
