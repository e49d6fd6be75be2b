//! Notion HTTP 客户端
//!
//! 以会话 cookie 与身份头直接调用 Notion 内部接口：
//! - `runInferenceTranscript`: 发送 transcript，响应为 NDJSON 流
//! - `getSpaces`: 由 cookie 解析 user_id / space_id

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder};

use super::traits::{IdentityResolver, NotionTransport, UpstreamResponse};
use crate::config::NotionConfig;
use crate::credential::{CredentialEntry, Identity, Session};
use crate::error::RelayError;
use crate::logger::sanitize_log_message;
use crate::models::notion::NotionRequestBody;
use crate::proxy::{ClientCache, ProxyClientFactory};

const NOTION_ORIGIN: &str = "https://www.notion.so";
const NOTION_REFERER: &str = "https://www.notion.so/chat";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

/// Notion 客户端
#[derive(Debug)]
pub struct NotionClient {
    clients: ClientCache,
    api_url: String,
    spaces_url: String,
    client_version: String,
}

impl NotionClient {
    pub fn new(config: &NotionConfig) -> Result<Self, RelayError> {
        let factory = ProxyClientFactory::new()
            .with_global_proxy(config.proxy_url.clone())
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs))
            .with_user_agent(USER_AGENT);
        let clients = ClientCache::new(factory).map_err(|e| RelayError::Config(e.to_string()))?;

        Ok(Self {
            clients,
            api_url: config.api_url.clone(),
            spaces_url: config.spaces_url.clone(),
            client_version: config.client_version.clone(),
        })
    }

    fn client_for(&self, proxy_url: Option<&str>) -> Result<Client, RelayError> {
        self.clients
            .client_for(proxy_url)
            .map_err(|e| RelayError::Config(e.to_string()))
    }

    /// 附加浏览器端请求头与 cookie
    fn with_browser_headers(&self, builder: RequestBuilder, cookie: &str) -> RequestBuilder {
        builder
            .header("accept-language", "en-US,en;q=0.9")
            .header("notion-audit-log-platform", "web")
            .header("notion-client-version", &self.client_version)
            .header("origin", NOTION_ORIGIN)
            .header("referer", NOTION_REFERER)
            .header("user-agent", USER_AGENT)
            .header("cookie", cookie)
    }

    fn inference_request(
        &self,
        client: &Client,
        session: &Session,
        body: &NotionRequestBody,
    ) -> RequestBuilder {
        let builder = client
            .post(&self.api_url)
            .header("content-type", "application/json")
            .header("accept", "application/x-ndjson")
            .header("x-notion-active-user-header", &session.user_id)
            .header("x-notion-space-id", &session.space_id)
            .json(body);
        self.with_browser_headers(builder, &session.cookie)
    }
}

#[async_trait]
impl NotionTransport for NotionClient {
    async fn send(
        &self,
        session: &Session,
        body: &NotionRequestBody,
    ) -> Result<UpstreamResponse, RelayError> {
        let client = self.client_for(session.proxy_url.as_deref())?;
        tracing::info!(
            "[NOTION] 发送请求: user={}, thread={}, items={}",
            session.user_id,
            body.thread_id.as_deref().unwrap_or("-"),
            body.transcript.len()
        );

        let resp = self
            .inference_request(&client, session, body)
            .send()
            .await
            .map_err(|e| RelayError::UpstreamTransport(sanitize_log_message(&e.to_string())))?;

        let status = resp.status().as_u16();
        let stream = resp
            .bytes_stream()
            .map_err(|e| RelayError::UpstreamTransport(e.to_string()))
            .boxed();
        Ok(UpstreamResponse::new(status, stream))
    }
}

#[async_trait]
impl IdentityResolver for NotionClient {
    async fn resolve(&self, entry: &CredentialEntry) -> Result<Identity, RelayError> {
        let client = self.client_for(entry.proxy_url.as_deref())?;
        let builder = client
            .post(&self.spaces_url)
            .header("content-type", "application/json")
            .json(&serde_json::json!({}));

        let resp = self
            .with_browser_headers(builder, &entry.cookie_header())
            .send()
            .await
            .map_err(|e| RelayError::UpstreamTransport(sanitize_log_message(&e.to_string())))?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(RelayError::UpstreamAuth(format!("getSpaces 返回 {}", status)));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                message: sanitize_log_message(&text),
            });
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RelayError::UpstreamProtocol(format!("解析 getSpaces 响应失败: {}", e)))?;

        parse_spaces_identity(&value).ok_or_else(|| {
            RelayError::UpstreamProtocol("getSpaces 响应中没有用户或工作区".to_string())
        })
    }
}

/// 从 getSpaces 响应中提取身份
///
/// 响应以 user_id 为键，其下 `space` 对象以 space_id 为键；
/// 取第一个拥有工作区的用户及其第一个工作区。
pub fn parse_spaces_identity(value: &serde_json::Value) -> Option<Identity> {
    value.as_object()?.iter().find_map(|(user_id, user)| {
        let space_id = user.get("space")?.as_object()?.keys().next()?;
        Some(Identity {
            user_id: user_id.clone(),
            space_id: space_id.clone(),
        })
    })
}
