//! 上游客户端工厂
//!
//! 创建访问 Notion 的 HTTP 客户端，支持全局代理与按会话代理
//! （socks5、http、https 协议），并按代理地址缓存客户端。

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{Client, Proxy};
use thiserror::Error;

/// 代理协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Socks5,
    Http,
    Https,
}

impl ProxyProtocol {
    /// 从 URL 字符串解析代理协议
    pub fn from_url(url: &str) -> Option<Self> {
        let url_lower = url.trim().to_lowercase();
        if url_lower.starts_with("socks5://") || url_lower.starts_with("socks5h://") {
            Some(ProxyProtocol::Socks5)
        } else if url_lower.starts_with("http://") {
            Some(ProxyProtocol::Http)
        } else if url_lower.starts_with("https://") {
            Some(ProxyProtocol::Https)
        } else {
            None
        }
    }
}

/// 代理错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("无效的代理 URL: {0}")]
    InvalidUrl(String),

    #[error("不支持的代理协议: {0}")]
    UnsupportedProtocol(String),

    #[error("代理配置错误: {0}")]
    ConfigError(String),

    #[error("客户端构建错误: {0}")]
    ClientBuildError(String),
}

/// 上游客户端工厂
#[derive(Debug, Clone)]
pub struct ProxyClientFactory {
    /// 全局代理 URL（会话未指定代理时使用）
    global_proxy: Option<String>,
    connect_timeout: Duration,
    /// 整个请求（含流式读取）的超时时间
    request_timeout: Duration,
    user_agent: Option<String>,
}

impl Default for ProxyClientFactory {
    fn default() -> Self {
        Self {
            global_proxy: None,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
            user_agent: None,
        }
    }
}

impl ProxyClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global_proxy(mut self, proxy_url: Option<String>) -> Self {
        self.global_proxy = proxy_url.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// 解析代理 URL 并返回协议类型
    ///
    /// # 返回
    /// - `Ok(ProxyProtocol)`: 解析成功的协议类型
    /// - `Err(ProxyError)`: 空 URL 或不支持的协议
    pub fn parse_proxy_url(url: &str) -> Result<ProxyProtocol, ProxyError> {
        if url.trim().is_empty() {
            return Err(ProxyError::InvalidUrl("代理 URL 不能为空".to_string()));
        }

        ProxyProtocol::from_url(url).ok_or_else(|| ProxyError::UnsupportedProtocol(url.to_string()))
    }

    /// 选择要使用的代理 URL：会话代理优先，其次全局代理
    pub fn select_proxy<'a>(&'a self, session_proxy: Option<&'a str>) -> Option<&'a str> {
        session_proxy
            .filter(|p| !p.trim().is_empty())
            .or(self.global_proxy.as_deref())
    }

    /// 创建 HTTP 客户端
    pub fn create_client(&self, session_proxy: Option<&str>) -> Result<Client, ProxyError> {
        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout);

        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        if let Some(url) = self.select_proxy(session_proxy) {
            Self::parse_proxy_url(url)?;
            let proxy = Proxy::all(url).map_err(|e| ProxyError::ConfigError(e.to_string()))?;
            tracing::info!("[PROXY] 使用上游代理: {}", url);
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| ProxyError::ClientBuildError(e.to_string()))
    }
}

/// 按代理地址缓存的客户端集合
///
/// reqwest 客户端内部持有连接池，同一代理的请求复用同一个客户端。
#[derive(Debug)]
pub struct ClientCache {
    factory: ProxyClientFactory,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ClientCache {
    /// 创建缓存并预先构建默认客户端（用于尽早暴露代理配置错误）
    pub fn new(factory: ProxyClientFactory) -> Result<Self, ProxyError> {
        let default_client = factory.create_client(None)?;
        let key = factory.select_proxy(None).map(str::to_string);
        let mut clients = HashMap::new();
        clients.insert(key, default_client);
        Ok(Self {
            factory,
            clients: Mutex::new(clients),
        })
    }

    /// 获取会话对应的客户端
    pub fn client_for(&self, session_proxy: Option<&str>) -> Result<Client, ProxyError> {
        let key = self.factory.select_proxy(session_proxy).map(str::to_string);
        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(client.clone());
        }

        let client = self.factory.create_client(session_proxy)?;
        self.clients.lock().insert(key, client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
