//! 凭证源加载
//!
//! 支持内联 cookie 列表与外部凭证文件两种来源：
//! - 内联：以 `|` 或换行分隔的 cookie 值
//! - 文件：JSON 数组（字符串或对象），或每行一个 cookie（`#` 开头为注释）

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::pool::PoolError;
use super::types::CredentialEntry;

/// 凭证源
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    /// 内联 cookie 串
    Inline(String),
    /// 外部凭证文件
    File(PathBuf),
    /// 已解析的条目
    Entries(Vec<CredentialEntry>),
    /// 依次尝试，使用第一个产生条目的来源
    Fallback(Vec<CredentialSource>),
}

/// 文件中的一项：裸字符串或带身份信息的对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileEntry {
    Cookie(String),
    Detailed(CredentialEntry),
}

impl CredentialSource {
    /// 加载凭证条目
    ///
    /// `Fallback` 中某个来源失败或为空时继续尝试下一个，只记录日志。
    pub async fn load(&self) -> Result<Vec<CredentialEntry>, PoolError> {
        match self {
            CredentialSource::Inline(raw) => Ok(parse_inline(raw)),
            CredentialSource::File(path) => load_file(path).await,
            CredentialSource::Entries(entries) => Ok(entries
                .iter()
                .filter(|e| !e.cookie.trim().is_empty())
                .cloned()
                .collect()),
            CredentialSource::Fallback(sources) => {
                for source in sources {
                    match Box::pin(source.load()).await {
                        Ok(entries) if !entries.is_empty() => return Ok(entries),
                        Ok(_) => {
                            tracing::warn!("[POOL] 凭证源 {} 未提供任何凭证", source.describe())
                        }
                        Err(e) => {
                            tracing::warn!("[POOL] 凭证源 {} 加载失败: {}", source.describe(), e)
                        }
                    }
                }
                Ok(Vec::new())
            }
        }
    }

    /// 用于日志的简短描述（不含 cookie 内容）
    pub fn describe(&self) -> String {
        match self {
            CredentialSource::Inline(_) => "inline".to_string(),
            CredentialSource::File(path) => format!("file:{}", path.display()),
            CredentialSource::Entries(entries) => format!("entries({})", entries.len()),
            CredentialSource::Fallback(sources) => format!("fallback({})", sources.len()),
        }
    }
}

/// 解析内联 cookie 串
pub fn parse_inline(raw: &str) -> Vec<CredentialEntry> {
    raw.split(['|', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CredentialEntry::from_cookie)
        .collect()
}

/// 解析凭证文件内容
pub fn parse_file_content(content: &str) -> Result<Vec<CredentialEntry>, PoolError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let items: Vec<FileEntry> =
            serde_json::from_str(trimmed).map_err(|e| PoolError::Parse(e.to_string()))?;
        return Ok(items
            .into_iter()
            .map(|item| match item {
                FileEntry::Cookie(cookie) => CredentialEntry::from_cookie(cookie),
                FileEntry::Detailed(mut entry) => {
                    entry.cookie = entry.cookie.trim().to_string();
                    entry
                }
            })
            .filter(|e| !e.cookie.is_empty())
            .collect());
    }

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(CredentialEntry::from_cookie)
        .collect())
}

async fn load_file(path: &Path) -> Result<Vec<CredentialEntry>, PoolError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PoolError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let entries = parse_file_content(&content)?;
    tracing::info!(
        "[POOL] 从 {} 读取到 {} 个凭证",
        path.display(),
        entries.len()
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_inline_separators() {
        let entries = parse_inline("a1| b2 |\nc3\n\n|");
        let cookies: Vec<_> = entries.iter().map(|e| e.cookie.as_str()).collect();
        assert_eq!(cookies, vec!["a1", "b2", "c3"]);
    }

    #[test]
    fn test_parse_file_lines_with_comments() {
        let entries = parse_file_content("# main\ncookie-a\n\n  cookie-b  \n#cookie-c\n").unwrap();
        let cookies: Vec<_> = entries.iter().map(|e| e.cookie.as_str()).collect();
        assert_eq!(cookies, vec!["cookie-a", "cookie-b"]);
    }

    #[test]
    fn test_parse_file_json_mixed() {
        let entries = parse_file_content(
            r#"["plain", {"cookie": "token_v2=x", "user_id": "u", "space_id": "s", "proxy_url": "socks5://127.0.0.1:1080"}, ""]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cookie, "plain");
        assert_eq!(entries[1].user_id.as_deref(), Some("u"));
        assert_eq!(
            entries[1].proxy_url.as_deref(),
            Some("socks5://127.0.0.1:1080")
        );
    }

    #[test]
    fn test_parse_file_bad_json() {
        assert!(matches!(
            parse_file_content("[not json"),
            Err(PoolError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_load_file_and_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();

        let source = CredentialSource::Fallback(vec![
            CredentialSource::File(PathBuf::from("/nonexistent/cookies.txt")),
            CredentialSource::File(file.path().to_path_buf()),
            CredentialSource::Inline("inline".into()),
        ]);
        let entries = source.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cookie, "from-file");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = CredentialSource::File(PathBuf::from("/nonexistent/cookies.txt"));
        assert!(matches!(source.load().await, Err(PoolError::Io { .. })));
    }
}
