//! Notion 回复转换为 OpenAI 格式

use crate::models::openai::{
    ChatCompletionResponse, Choice, ModelInfo, ModelList, ResponseMessage, Usage,
};
use crate::stream::CollectedResponse;
use crate::translator::notion::NOTION_MODELS;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 创建完成的 OpenAI 响应
///
/// 上游没有报告用量时 usage 为全零。
pub fn create_openai_response(collected: &CollectedResponse, model: &str) -> ChatCompletionResponse {
    let usage = collected
        .usage
        .as_ref()
        .map(|u| u.to_openai())
        .unwrap_or_else(Usage::default);

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: collected.content.clone(),
                reasoning_content: collected.reasoning_content().map(str::to_string),
            },
            finish_reason: collected.finish_reason.unwrap_or("stop").to_string(),
        }],
        usage: Some(usage),
    }
}

/// 可用模型列表
pub fn create_model_list() -> ModelList {
    let created = unix_now();
    ModelList {
        object: "list".to_string(),
        data: NOTION_MODELS
            .iter()
            .map(|(id, display_name)| ModelInfo {
                id: id.to_string(),
                object: "model".to_string(),
                created,
                owned_by: "notion".to_string(),
                display_name: display_name.to_string(),
            })
            .collect(),
    }
}
