//! OpenAI 请求转换为 Notion transcript 请求
//!
//! # 续接规则
//!
//! - 历史中最新的 assistant 消息带有 thread 标记：只发送最新一条 user 消息
//! - 否则：发送全部历史并创建新 thread
//!
//! 两种情况都会在 transcript 开头放置 config（模型）与 context（身份、时区、随机显示名）条目。

use chrono::SecondsFormat;
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use super::continuity;
use crate::credential::Session;
use crate::models::notion::{
    generate_custom_id, ConfigValue, ContextValue, DebugOverrides, NotionRequestBody,
    TranscriptItem,
};
use crate::models::openai::{ChatCompletionRequest, ChatMessage, MessageRole};
use crate::translator::traits::TranslateError;

/// Notion 可用模型（id, 显示名）
pub const NOTION_MODELS: &[(&str, &str)] = &[
    ("oatmeal-cookie", "GPT 5.2"),
    ("apple-danish", "Claude Opus 4.5"),
    ("gateau-roule", "GEMINI 3 Pro"),
];

const SPACE_NAME_WORDS: &[&str] = &[
    "Project",
    "Workspace",
    "Team",
    "Studio",
    "Lab",
    "Hub",
    "Zone",
    "Space",
];

const CONTEXT_SURFACE: &str = "home_module";

/// 转换后的请求
#[derive(Debug, Clone, PartialEq)]
pub struct NotionRequest {
    pub body: NotionRequestBody,
    pub is_new_thread: bool,
}

/// OpenAI 到 Notion 请求转换器
#[derive(Debug, Clone)]
pub struct NotionRequestTranslator {
    default_model: String,
    timezone: String,
}

impl Default for NotionRequestTranslator {
    fn default() -> Self {
        Self::new("anthropic-sonnet-4", "America/Los_Angeles")
    }
}

impl NotionRequestTranslator {
    pub fn new(default_model: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            timezone: timezone.into(),
        }
    }

    /// 请求实际使用的模型名
    pub fn resolve_model(&self, request: &ChatCompletionRequest) -> String {
        request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }

    /// 构建 transcript 请求
    ///
    /// # 参数
    /// - `request`: 客户端请求
    /// - `session`: 本次交换使用的会话
    /// - `thread_id`: 续接令牌（来自 `continuity::extract`）
    ///
    /// # 返回
    /// - `Err(TranslateError::NoSession)`: 未提供会话
    pub fn build(
        &self,
        request: &ChatCompletionRequest,
        session: Option<&Session>,
        thread_id: Option<&str>,
    ) -> Result<NotionRequest, TranslateError> {
        let session = session.ok_or_else(TranslateError::no_session)?;
        if request.messages.is_empty() {
            return Err(TranslateError::invalid_request("messages 不能为空"));
        }

        let now = chrono::Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
        let mut transcript = vec![
            TranscriptItem::Config {
                id: generate_custom_id(),
                value: ConfigValue::markdown_chat(self.resolve_model(request)),
            },
            TranscriptItem::Context {
                id: generate_custom_id(),
                value: self.context_value(session, &now),
            },
        ];

        let turns: Vec<&ChatMessage> = match thread_id {
            Some(_) => request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
                .into_iter()
                .collect(),
            None => request.messages.iter().collect(),
        };
        if turns.is_empty() {
            return Err(TranslateError::invalid_request("续接请求中没有 user 消息"));
        }

        transcript.extend(
            turns
                .into_iter()
                .filter_map(|message| turn_item(message, session, &now)),
        );

        Ok(NotionRequest {
            body: NotionRequestBody {
                trace_id: Uuid::new_v4().to_string(),
                space_id: session.space_id.clone(),
                transcript,
                thread_id: thread_id.map(str::to_string),
                create_thread: thread_id.is_none(),
                debug_overrides: DebugOverrides::default(),
                generate_title: true,
                save_all_thread_operations: true,
            },
            is_new_thread: thread_id.is_none(),
        })
    }

    fn context_value(&self, session: &Session, now: &str) -> ContextValue {
        let mut rng = rand::thread_rng();
        let word = SPACE_NAME_WORDS.choose(&mut rng).copied().unwrap_or("Space");
        ContextValue {
            user_id: session.user_id.clone(),
            space_id: session.space_id.clone(),
            surface: CONTEXT_SURFACE.to_string(),
            timezone: self.timezone.clone(),
            user_name: format!("User{}", rng.gen_range(100..1000)),
            space_name: format!("{} {}", word, rng.gen_range(1..100)),
            space_view_id: Uuid::new_v4().to_string(),
            current_datetime: now.to_string(),
        }
    }
}

/// 单条消息转换为 transcript 条目；tool 等其他角色返回 None
fn turn_item(message: &ChatMessage, session: &Session, now: &str) -> Option<TranscriptItem> {
    let content = continuity::strip(&message.flattened_text());
    match message.role {
        MessageRole::System | MessageRole::User => Some(TranscriptItem::User {
            id: generate_custom_id(),
            value: vec![vec![content]],
            user_id: session.user_id.clone(),
            created_at: now.to_string(),
        }),
        MessageRole::Assistant => Some(TranscriptItem::Assistant {
            id: generate_custom_id(),
            value: content,
            trace_id: Uuid::new_v4().to_string(),
            created_at: now.to_string(),
        }),
        MessageRole::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openai::{ContentPart, MessageContent};
    use crate::translator::TranslateErrorKind;

    const TID: &str = "0a1b2c3d-4e5f-6789-abcd-ef0123456789";

    fn session() -> Session {
        Session {
            cookie: "token_v2=c".into(),
            user_id: "user-1".into(),
            space_id: "space-1".into(),
            proxy_url: None,
        }
    }

    fn request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: Some("apple-danish".into()),
            messages,
            stream: false,
        }
    }

    fn user_turns(body: &NotionRequestBody) -> Vec<String> {
        body.transcript
            .iter()
            .filter_map(|item| match item {
                TranscriptItem::User { value, .. } => Some(value[0][0].clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_conversation_sends_full_history() {
        let req = request(vec![
            ChatMessage::text(MessageRole::System, "be brief"),
            ChatMessage::text(MessageRole::User, "hi"),
            ChatMessage::text(MessageRole::Assistant, "hello"),
            ChatMessage::text(MessageRole::User, "how are you"),
        ]);
        let built = NotionRequestTranslator::default()
            .build(&req, Some(&session()), None)
            .unwrap();

        assert!(built.is_new_thread);
        assert!(built.body.create_thread);
        assert!(built.body.thread_id.is_none());
        assert_eq!(built.body.space_id, "space-1");
        assert_eq!(built.body.transcript.len(), 6);
        assert!(matches!(
            &built.body.transcript[0],
            TranscriptItem::Config { value, .. } if value.model == "apple-danish"
        ));
        match &built.body.transcript[1] {
            TranscriptItem::Context { value, .. } => {
                assert_eq!(value.user_id, "user-1");
                assert_eq!(value.surface, "home_module");
                assert_eq!(value.timezone, "America/Los_Angeles");
                assert!(value.user_name.starts_with("User"));
                assert_eq!(value.user_name.len(), 7);
                let (word, number) = value.space_name.split_once(' ').unwrap();
                assert!(SPACE_NAME_WORDS.contains(&word));
                let number: u32 = number.parse().unwrap();
                assert!((1..100).contains(&number));
            }
            other => panic!("expected context item, got {:?}", other),
        }
        assert_eq!(
            user_turns(&built.body),
            vec!["be brief", "hi", "how are you"]
        );
        match &built.body.transcript[4] {
            TranscriptItem::Assistant {
                value,
                trace_id,
                created_at,
                ..
            } => {
                assert_eq!(value, "hello");
                assert!(Uuid::parse_str(trace_id).is_ok());
                assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
            }
            other => panic!("expected assistant item, got {:?}", other),
        }

        let json = serde_json::to_value(&built.body.transcript[4]).unwrap();
        assert_eq!(json["type"], "markdown-chat");
        assert!(json["traceId"].is_string());
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn test_continuation_sends_latest_user_turn_only() {
        let req = request(vec![
            ChatMessage::text(MessageRole::User, "first"),
            ChatMessage::text(MessageRole::Assistant, continuity::embed("reply", TID)),
            ChatMessage::text(MessageRole::User, "second"),
        ]);
        let thread_id = continuity::extract(&req.messages);
        assert_eq!(thread_id.as_deref(), Some(TID));

        let built = NotionRequestTranslator::default()
            .build(&req, Some(&session()), thread_id.as_deref())
            .unwrap();

        assert!(!built.is_new_thread);
        assert!(!built.body.create_thread);
        assert_eq!(built.body.thread_id.as_deref(), Some(TID));
        assert_eq!(
            built.body.transcript.iter().filter(|i| i.is_user_turn()).count(),
            1
        );
        assert_eq!(user_turns(&built.body), vec!["second"]);
        assert!(!built
            .body
            .transcript
            .iter()
            .any(|i| matches!(i, TranscriptItem::Assistant { .. })));
    }

    #[test]
    fn test_markers_stripped_and_parts_flattened() {
        let req = request(vec![
            ChatMessage::text(MessageRole::User, "q"),
            ChatMessage::text(MessageRole::Assistant, continuity::embed("answer", TID)),
            ChatMessage {
                role: MessageRole::User,
                content: Some(MessageContent::Parts(vec![
                    ContentPart::Text { text: "a".into() },
                    ContentPart::ImageUrl {
                        image_url: serde_json::json!({"url": "x"}),
                    },
                    ContentPart::Text { text: "b".into() },
                ])),
            },
            ChatMessage::text(MessageRole::Other, "tool output"),
        ]);
        let built = NotionRequestTranslator::default()
            .build(&req, Some(&session()), None)
            .unwrap();

        assert!(matches!(
            &built.body.transcript[3],
            TranscriptItem::Assistant { value, .. } if value == "answer"
        ));
        assert_eq!(user_turns(&built.body), vec!["q", "ab"]);
        assert_eq!(built.body.transcript.len(), 5);
    }

    #[test]
    fn test_missing_session() {
        let req = request(vec![ChatMessage::text(MessageRole::User, "hi")]);
        let err = NotionRequestTranslator::default()
            .build(&req, None, None)
            .unwrap_err();
        assert_eq!(err.kind, TranslateErrorKind::NoSession);
    }

    #[test]
    fn test_empty_messages_rejected() {
        let req = request(vec![]);
        let err = NotionRequestTranslator::default()
            .build(&req, Some(&session()), None)
            .unwrap_err();
        assert_eq!(err.kind, TranslateErrorKind::InvalidRequest);
    }

    #[test]
    fn test_default_model_when_missing() {
        let mut req = request(vec![ChatMessage::text(MessageRole::User, "hi")]);
        req.model = Some("  ".into());
        let translator = NotionRequestTranslator::new("anthropic-sonnet-4", "UTC");
        assert_eq!(translator.resolve_model(&req), "anthropic-sonnet-4");
    }
}
