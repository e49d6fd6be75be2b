//! Provider Trait 定义
//!
//! 会话核心只依赖两个抽象能力：
//! - `NotionTransport`: 以会话身份发出一次 transcript 请求并拿回字节流
//! - `IdentityResolver`: 由 cookie 解析出 user_id / space_id

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::credential::{CredentialEntry, Identity, Session};
use crate::error::RelayError;
use crate::models::notion::NotionRequestBody;

/// 上游响应体字节流
pub type ByteStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// 上游响应：状态码 + 未读取的响应体
pub struct UpstreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl UpstreamResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 读取响应体文本（用于错误信息），最多 `limit` 字节
    pub async fn read_text(mut self, limit: usize) -> String {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(bytes) => {
                    buf.extend_from_slice(&bytes);
                    if buf.len() >= limit {
                        buf.truncate(limit);
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Notion 传输层
#[async_trait]
pub trait NotionTransport: Send + Sync {
    /// 以 `session` 的身份发送 transcript 请求
    ///
    /// 只在网络层失败时返回错误；非 2xx 状态码通过 `UpstreamResponse::status` 返回。
    async fn send(
        &self,
        session: &Session,
        body: &NotionRequestBody,
    ) -> Result<UpstreamResponse, RelayError>;
}

/// 身份解析
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, entry: &CredentialEntry) -> Result<Identity, RelayError>;
}
