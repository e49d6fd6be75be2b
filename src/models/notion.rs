//! Notion AI (runInferenceTranscript) 数据模型
//!
//! 请求侧为 transcript 请求体，响应侧为 NDJSON 记录（以 `type` 字段区分的标签联合）。

use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// 请求
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotionRequestBody {
    pub trace_id: String,
    pub space_id: String,
    pub transcript: Vec<TranscriptItem>,
    pub thread_id: Option<String>,
    pub create_thread: bool,
    pub debug_overrides: DebugOverrides,
    pub generate_title: bool,
    pub save_all_thread_operations: bool,
}

/// transcript 条目
///
/// 每个条目都带有 `generate_custom_id` 生成的 id。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TranscriptItem {
    #[serde(rename = "config")]
    Config { id: String, value: ConfigValue },

    #[serde(rename = "context")]
    Context { id: String, value: ContextValue },

    /// system / user 轮次
    #[serde(rename = "user", rename_all = "camelCase")]
    User {
        id: String,
        value: Vec<Vec<String>>,
        user_id: String,
        created_at: String,
    },

    /// assistant 轮次
    #[serde(rename = "markdown-chat", rename_all = "camelCase")]
    Assistant {
        id: String,
        value: String,
        trace_id: String,
        created_at: String,
    },
}

impl TranscriptItem {
    pub fn id(&self) -> &str {
        match self {
            TranscriptItem::Config { id, .. }
            | TranscriptItem::Context { id, .. }
            | TranscriptItem::User { id, .. }
            | TranscriptItem::Assistant { id, .. } => id,
        }
    }

    pub fn is_user_turn(&self) -> bool {
        matches!(self, TranscriptItem::User { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub model: String,
}

impl ConfigValue {
    pub fn markdown_chat(model: impl Into<String>) -> Self {
        Self {
            kind: "markdown-chat".to_string(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextValue {
    pub user_id: String,
    pub space_id: String,
    pub surface: String,
    pub timezone: String,
    pub user_name: String,
    pub space_name: String,
    pub space_view_id: String,
    pub current_datetime: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebugOverrides {
    pub cached_inferences: serde_json::Map<String, serde_json::Value>,
    pub annotation_inferences: serde_json::Map<String, serde_json::Value>,
    pub emit_inferences: bool,
}

/// 生成 transcript 条目 id
///
/// 固定结构 `2036702a-4d19-80xx-xxxx-00aaxxxxxxxx`，x 为随机十六进制字符。
pub fn generate_custom_id() -> String {
    let mut rng = rand::thread_rng();
    let mut hex = |len: usize| -> String {
        (0..len)
            .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
            .collect()
    };
    let part3 = format!("80{}", hex(2));
    let part4 = hex(4);
    let part5 = format!("00aa{}", hex(8));
    format!("2036702a-4d19-{}-{}-{}", part3, part4, part5)
}

// ============================================================================
// 响应 (NDJSON)
// ============================================================================

/// 一条 NDJSON 记录
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NotionEnvelope {
    /// 当前格式：多通道累计内容数组
    #[serde(rename = "agent-inference")]
    AgentInference(AgentInferenceRecord),

    /// 旧格式：整体替换的单一文本
    #[serde(rename = "markdown-chat")]
    MarkdownChat(MarkdownChatRecord),

    #[serde(rename = "error")]
    Error(ErrorRecord),

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentInferenceRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub value: Vec<InferenceValue>,
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
    #[serde(default)]
    pub cached_tokens_read: Option<u32>,
    #[serde(default)]
    pub cached_tokens_created: Option<u32>,
}

impl AgentInferenceRecord {
    /// 会话续接 id，优先使用 threadId
    pub fn conversation_id(&self) -> Option<&str> {
        self.thread_id.as_deref().or(self.id.as_deref())
    }

    pub fn reports_usage(&self) -> bool {
        self.input_tokens.is_some() || self.output_tokens.is_some()
    }
}

/// agent-inference 中的通道条目
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InferenceValue {
    Text {
        #[serde(default)]
        content: Option<String>,
    },
    Thinking {
        #[serde(default)]
        content: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MarkdownChatRecord {
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ErrorRecord {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ErrorRecord {
    pub fn describe(&self) -> String {
        match (&self.message, &self.error) {
            (Some(message), _) => message.clone(),
            (None, Some(error)) => error.to_string(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_custom_id_shape() {
        let re = Regex::new(r"^2036702a-4d19-80[0-9a-f]{2}-[0-9a-f]{4}-00aa[0-9a-f]{8}$").unwrap();
        for _ in 0..32 {
            let id = generate_custom_id();
            assert!(re.is_match(&id), "unexpected id: {}", id);
        }
    }

    #[test]
    fn test_transcript_item_serialization() {
        let item = TranscriptItem::User {
            id: "a".into(),
            value: vec![vec!["hi".into()]],
            user_id: "u1".into(),
            created_at: "2025-01-01T00:00:00.000+00:00".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "user");
        assert_eq!(json["value"][0][0], "hi");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["createdAt"], "2025-01-01T00:00:00.000+00:00");

        let item = TranscriptItem::Config {
            id: "b".into(),
            value: ConfigValue::markdown_chat("apple-danish"),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "config");
        assert_eq!(json["value"]["type"], "markdown-chat");
        assert_eq!(json["value"]["model"], "apple-danish");
    }

    #[test]
    fn test_request_body_field_names() {
        let body = NotionRequestBody {
            trace_id: "t".into(),
            space_id: "s".into(),
            transcript: vec![],
            thread_id: None,
            create_thread: true,
            debug_overrides: DebugOverrides::default(),
            generate_title: true,
            save_all_thread_operations: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["spaceId"], "s");
        assert!(json["threadId"].is_null());
        assert_eq!(json["createThread"], true);
        assert_eq!(json["debugOverrides"]["emitInferences"], false);
        assert!(json["debugOverrides"]["cachedInferences"].is_object());
        assert_eq!(json["saveAllThreadOperations"], true);
    }

    #[test]
    fn test_envelope_variants() {
        let env: NotionEnvelope = serde_json::from_str(
            r#"{"type":"agent-inference","id":"abc","value":[{"type":"thinking","content":"hm"},{"type":"text","content":"Hi"},{"type":"tool-use"}],"inputTokens":3,"outputTokens":1}"#,
        )
        .unwrap();
        match env {
            NotionEnvelope::AgentInference(record) => {
                assert_eq!(record.conversation_id(), Some("abc"));
                assert!(record.reports_usage());
                assert_eq!(record.value.len(), 3);
                assert_eq!(record.value[2], InferenceValue::Other);
            }
            other => panic!("unexpected envelope: {:?}", other),
        }

        let env: NotionEnvelope =
            serde_json::from_str(r#"{"type":"markdown-chat","value":"legacy"}"#).unwrap();
        assert_eq!(
            env,
            NotionEnvelope::MarkdownChat(MarkdownChatRecord {
                value: "legacy".into()
            })
        );

        let env: NotionEnvelope =
            serde_json::from_str(r#"{"type":"title","value":"x"}"#).unwrap();
        assert_eq!(env, NotionEnvelope::Unknown);
    }

    #[test]
    fn test_thread_id_preferred_over_id() {
        let env: NotionEnvelope = serde_json::from_str(
            r#"{"type":"agent-inference","id":"step","threadId":"thread","value":[]}"#,
        )
        .unwrap();
        let NotionEnvelope::AgentInference(record) = env else {
            panic!("expected agent-inference");
        };
        assert_eq!(record.conversation_id(), Some("thread"));
    }
}
