//! 配置管理
//!
//! 加载顺序：YAML 配置文件 → `.env` → 环境变量覆盖。
//! 所有字段都有默认值，缺省配置即可在本地启动（需提供 cookie）。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::{parse_inline, CredentialEntry, CredentialSource};
use crate::proxy::ProxyClientFactory;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "NOTIONCAST_CONFIG";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub notion: NotionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 客户端访问使用的 Bearer token
    pub api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            api_key: "default_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionConfig {
    /// 内联 cookie 列表
    pub cookies: Vec<String>,
    /// 凭证文件（优先于内联 cookie）
    pub cookie_file: Option<PathBuf>,
    pub api_url: String,
    pub spaces_url: String,
    pub client_version: String,
    pub timezone: String,
    pub default_model: String,
    /// 全局上游代理
    pub proxy_url: Option<String>,
    pub first_byte_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            cookies: Vec::new(),
            cookie_file: None,
            api_url: "https://www.notion.so/api/v3/runInferenceTranscript".to_string(),
            spaces_url: "https://www.notion.so/api/v3/getSpaces".to_string(),
            client_version: "23.13.0.3686".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            default_model: "anthropic-sonnet-4".to_string(),
            proxy_url: None,
            first_byte_timeout_secs: 30,
            request_timeout_secs: 300,
        }
    }
}

impl NotionConfig {
    /// 构建凭证源：文件优先，内联 cookie 作为后备
    pub fn credential_source(&self) -> CredentialSource {
        let mut sources = Vec::new();
        if let Some(path) = &self.cookie_file {
            sources.push(CredentialSource::File(expand_tilde(path)));
        }
        if !self.cookies.is_empty() {
            sources.push(CredentialSource::Entries(
                self.cookies
                    .iter()
                    .map(CredentialEntry::from_cookie)
                    .collect(),
            ));
        }

        match sources.len() {
            1 => sources.remove(0),
            _ => CredentialSource::Fallback(sources),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// 默认配置文件路径: ~/.notioncast/config.yaml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".notioncast")
            .join("config.yaml")
    }

    /// 加载完整配置
    ///
    /// `NOTIONCAST_CONFIG` 指定的文件必须存在；默认路径的文件不存在时使用默认值。
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_path(Path::new(&path))?,
            Err(_) => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from_path(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("[CONFIG] 加载配置文件: {}", path.display());
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// 应用环境变量覆盖
    ///
    /// `lookup` 返回变量值；空字符串视为未设置。
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get("NOTION_COOKIE") {
            self.notion.cookies = parse_inline(&raw).into_iter().map(|e| e.cookie).collect();
        }
        if let Some(path) = get("COOKIE_FILE") {
            self.notion.cookie_file = Some(PathBuf::from(path.trim()));
        }
        if let Some(token) = get("PROXY_AUTH_TOKEN") {
            self.server.api_key = token.trim().to_string();
        }
        if let Some(host) = get("HOST") {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = get("PORT") {
            match port.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("[CONFIG] 忽略无效的 PORT: {}", port),
            }
        }
        if let Some(proxy) = get("PROXY_URL") {
            self.notion.proxy_url = Some(proxy.trim().to_string());
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port 不能为 0".to_string()));
        }
        if self.server.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("server.api_key 不能为空".to_string()));
        }
        if self.notion.first_byte_timeout_secs == 0 || self.notion.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("超时时间必须大于 0".to_string()));
        }
        if let Some(proxy) = &self.notion.proxy_url {
            ProxyClientFactory::parse_proxy_url(proxy)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// 展开路径开头的 `~`
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
