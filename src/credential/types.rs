//! 会话池数据类型

use serde::{Deserialize, Serialize};

/// 凭证条目（配置或凭证文件中的一项）
///
/// `cookie` 为 `token_v2` 的值，可带或不带 `token_v2=` 前缀。
/// 同时提供 `user_id` 与 `space_id` 时跳过身份解析。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub cookie: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    /// 该凭证专用的上游代理
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

impl CredentialEntry {
    /// 从裸 cookie 值创建条目
    pub fn from_cookie(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into().trim().to_string(),
            user_id: None,
            space_id: None,
            proxy_url: None,
        }
    }

    /// 生成 Cookie 请求头的值
    pub fn cookie_header(&self) -> String {
        cookie_header_value(&self.cookie)
    }

    /// 条目自带的身份信息（两个 id 都存在时）
    pub fn explicit_identity(&self) -> Option<Identity> {
        match (&self.user_id, &self.space_id) {
            (Some(user_id), Some(space_id)) if !user_id.is_empty() && !space_id.is_empty() => {
                Some(Identity {
                    user_id: user_id.clone(),
                    space_id: space_id.clone(),
                })
            }
            _ => None,
        }
    }
}

/// 确保 cookie 带有 `token_v2=` 前缀
///
/// 已包含 `=`（完整的 cookie 串）时原样返回。
pub fn cookie_header_value(cookie: &str) -> String {
    let cookie = cookie.trim();
    if cookie.contains('=') {
        cookie.to_string()
    } else {
        format!("token_v2={}", cookie)
    }
}

/// 由 cookie 解析出的身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub space_id: String,
}

/// 一个后端会话：凭证 + 身份
///
/// 有效性由会话池维护，不在此结构中。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub cookie: String,
    pub user_id: String,
    pub space_id: String,
    pub proxy_url: Option<String>,
}

impl Session {
    pub fn new(entry: &CredentialEntry, identity: Identity) -> Self {
        Self {
            cookie: entry.cookie_header(),
            user_id: identity.user_id,
            space_id: identity.space_id,
            proxy_url: entry.proxy_url.clone(),
        }
    }
}

/// 单个会话的运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// 完成的交换次数
    pub exchanges: u64,
    /// 上游未返回任何内容的次数
    pub empty_responses: u64,
}

/// 单个会话的状态视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub index: usize,
    pub user_id: String,
    pub space_id: String,
    pub valid: bool,
    pub cookie_preview: String,
    #[serde(flatten)]
    pub stats: SessionStats,
}

/// 会话池状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total: usize,
    pub valid: usize,
    pub current_index: Option<usize>,
    pub sessions: Vec<SessionView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_prefix() {
        assert_eq!(cookie_header_value("abc123"), "token_v2=abc123");
        assert_eq!(cookie_header_value(" token_v2=abc "), "token_v2=abc");
        assert_eq!(
            cookie_header_value("token_v2=abc; notion_user_id=u"),
            "token_v2=abc; notion_user_id=u"
        );
    }

    #[test]
    fn test_explicit_identity_requires_both_ids() {
        let mut entry = CredentialEntry::from_cookie("c");
        assert!(entry.explicit_identity().is_none());

        entry.user_id = Some("u".into());
        assert!(entry.explicit_identity().is_none());

        entry.space_id = Some("s".into());
        assert_eq!(
            entry.explicit_identity(),
            Some(Identity {
                user_id: "u".into(),
                space_id: "s".into()
            })
        );
    }
}
