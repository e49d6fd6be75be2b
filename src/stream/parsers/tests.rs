//! 流解析器属性测试
//!
//! 使用 proptest 验证累计内容到增量的转换

use super::NotionStreamParser;
use crate::stream::StreamEvent;
use proptest::prelude::*;

fn arb_char() -> impl Strategy<Value = char> {
    prop_oneof![
        Just('a'),
        Just('Z'),
        Just(' '),
        Just('\n'),
        Just('"'),
        Just('é'),
        Just('你'),
        Just('😀'),
    ]
}

/// 最终文本 + 中间记录的截断位置（字符数，可乱序、可重复）
fn arb_updates() -> impl Strategy<Value = (String, Vec<usize>)> {
    proptest::collection::vec(arb_char(), 0..40).prop_flat_map(|chars| {
        let n = chars.len();
        (
            Just(chars.into_iter().collect::<String>()),
            proptest::collection::vec(0..=n, 0..12),
        )
    })
}

fn record(content: &str, legacy: bool) -> String {
    let value = if legacy {
        serde_json::json!({"type": "markdown-chat", "value": content})
    } else {
        serde_json::json!({
            "type": "agent-inference",
            "value": [{"type": "text", "content": content}]
        })
    };
    format!("{}\n", value)
}

/// 按给定的分块大小循环切分字节流
fn feed(parser: &mut NotionStreamParser, bytes: &[u8], sizes: &[usize]) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let mut offset = 0;
    let mut i = 0;
    while offset < bytes.len() {
        let size = sizes[i % sizes.len()];
        let end = (offset + size).min(bytes.len());
        events.extend(parser.process(&bytes[offset..end]));
        offset = end;
        i += 1;
    }
    events
}

fn text_of(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

proptest! {
    /// **Feature: notion-stream, Property 1: 增量拼接等于最终内容**
    /// *对于任意* 累计更新序列（含乱序、重复）与任意字节切分，
    /// 文本增量按发出顺序拼接后恰好等于最终累计内容
    #[test]
    fn prop_deltas_concatenate_to_final(
        (final_text, cuts) in arb_updates(),
        legacy in any::<bool>(),
        sizes in proptest::collection::vec(1usize..17, 1..8),
    ) {
        let mut input = String::new();
        for cut in &cuts {
            let prefix: String = final_text.chars().take(*cut).collect();
            input.push_str(&record(&prefix, legacy));
        }
        input.push_str(&record(&final_text, legacy));

        let mut parser = NotionStreamParser::new();
        let events = feed(&mut parser, input.as_bytes(), &sizes);

        prop_assert_eq!(text_of(&events), final_text.clone());
        prop_assert!(events.iter().all(|e| !e.is_terminal()));

        let tail = parser.finish(None);
        if final_text.is_empty() {
            prop_assert_eq!(tail, vec![StreamEvent::NoContent]);
        } else {
            prop_assert_eq!(tail, vec![StreamEvent::Done]);
        }
    }

    /// **Feature: notion-stream, Property 2: 无内容时的终止事件**
    /// *对于任意* 不含内容的记录序列，终止事件为 NoContent 且之前没有任何增量
    #[test]
    fn prop_no_content_terminal(
        kinds in proptest::collection::vec(0u8..4, 0..10),
        sizes in proptest::collection::vec(1usize..17, 1..8),
    ) {
        let mut input = String::new();
        for kind in kinds {
            let line = match kind {
                0 => "{\"recordMap\":{\"block\":{}}}".to_string(),
                1 => "{\"type\":\"title\",\"value\":\"x\"}".to_string(),
                2 => "not json at all".to_string(),
                _ => "{\"type\":\"agent-inference\",\"value\":[]}".to_string(),
            };
            input.push_str(&line);
            input.push('\n');
        }

        let mut parser = NotionStreamParser::new();
        let events = feed(&mut parser, input.as_bytes(), &sizes);
        prop_assert!(events.is_empty());
        prop_assert_eq!(parser.finish(Some("abc")), vec![StreamEvent::NoContent]);
    }
}
