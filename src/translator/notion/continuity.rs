//! 会话续接标记
//!
//! Notion 的 thread id 以 `<!-- tid:... -->` 注释的形式附加在 assistant 回复末尾，
//! 客户端回传历史时据此续接同一个后端会话。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::openai::{ChatMessage, MessageRole};

pub const THREAD_ID_PREFIX: &str = "\n\n<!-- tid:";
pub const THREAD_ID_SUFFIX: &str = " -->";

static THREAD_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!-- tid:([a-f0-9-]+) -->").expect("thread id pattern is valid"));

static THREAD_ID_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-f0-9-]+$").expect("thread id format is valid"));

/// thread id 是否可以嵌入标记
pub fn is_valid_thread_id(thread_id: &str) -> bool {
    THREAD_ID_FORMAT.is_match(thread_id)
}

/// 生成附加在回复末尾的标记；格式不符时返回 None
pub fn thread_marker(thread_id: &str) -> Option<String> {
    is_valid_thread_id(thread_id)
        .then(|| format!("{}{}{}", THREAD_ID_PREFIX, thread_id, THREAD_ID_SUFFIX))
}

/// 把标记附加到内容末尾
pub fn embed(content: &str, thread_id: &str) -> String {
    match thread_marker(thread_id) {
        Some(marker) => format!("{}{}", content, marker),
        None => content.to_string(),
    }
}

/// 从历史中提取 thread id
///
/// 从最新的消息向前找到第一条 assistant 消息，只在这一条中查找标记。
pub fn extract(messages: &[ChatMessage]) -> Option<String> {
    let last_assistant = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)?;
    let text = last_assistant.flattened_text();
    THREAD_ID_REGEX
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 移除内容中的标记及其带来的尾部空白
///
/// 一次替换后两侧文本可能拼出新的标记，重复替换直到不再匹配。
/// 没有标记时原样返回。
pub fn strip(content: &str) -> String {
    if !THREAD_ID_REGEX.is_match(content) {
        return content.to_string();
    }
    let mut text = content.to_string();
    while THREAD_ID_REGEX.is_match(&text) {
        text = THREAD_ID_REGEX.replace_all(&text, "").into_owned();
    }
    text.trim_end().to_string()
}
