//! 内联追踪器：把追踪器嵌入消息文本 / 从文本中取回，以及提示注入文本

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::chat::message::is_system_message;
use crate::chat::session::ChatLog;
use crate::chat::ChatMessage;
use crate::format::{yml, OutputFormat, Record};
use crate::reconcile::{clean_tracker, get_tracker, tracker_exists};
use crate::schema::{IncludeFilter, TrackerSchema};

static INLINE_RE: OnceLock<Regex> = OnceLock::new();

fn inline_re() -> &'static Regex {
    INLINE_RE.get_or_init(|| {
        Regex::new(r"<tracker>([\s\S]*?)</tracker>").expect("inline tracker pattern is valid")
    })
}

/// 注入到提示中的追踪器文本：只保留非默认内容（YAML），无内容时为空串
pub fn injection_text(tracker: Option<&Record>, schema: &TrackerSchema) -> String {
    let Some(tracker) = tracker.filter(|t| tracker_exists(Some(t), schema)) else {
        return String::new();
    };

    let cleaned = clean_tracker(tracker, schema, OutputFormat::Yaml, false).to_text();
    if cleaned.trim().is_empty() {
        return String::new();
    }
    tracing::debug!(tracker = %cleaned, "Injecting tracker");
    format!("<tracker>\n{cleaned}\n</tracker>")
}

pub fn injection_depth(position: usize, minimum_depth: usize) -> usize {
    position.max(minimum_depth)
}

/// 把消息自带的追踪器以 YAML 形式前置到文本中；没有追踪器时不做任何事
pub fn embed_inline_tracker(message: &mut ChatMessage) -> bool {
    let Some(tracker) = message.tracker.as_ref() else {
        return false;
    };
    let yaml = yml::serialize(&Value::Object(tracker.clone()));
    message.mes = format!("<tracker>{yaml}</tracker>\n\n{}", message.mes.trim());
    message.has_inline_tracker = true;
    true
}

/// 从文本中取回第一个内联追踪器。消息尚无追踪器时规范化并保存，同时从文本中移除该块。
pub fn extract_inline_tracker(message: &mut ChatMessage, schema: &TrackerSchema) -> bool {
    if message.tracker.is_some() {
        return false;
    }
    let Some(caps) = inline_re().captures(&message.mes) else {
        return false;
    };
    let payload = caps.get(1).map_or("", |m| m.as_str()).to_string();

    let tracker = get_tracker(payload, schema, IncludeFilter::All, true, OutputFormat::Json);
    message.tracker = Some(tracker.into_record());
    message.mes = strip_inline_block(&message.mes);
    true
}

fn strip_inline_block(text: &str) -> String {
    inline_re().replacen(text, 1, "").trim().to_string()
}

/// 移除文本中所有闭合的内联追踪器块；未闭合的标签保留
pub fn strip_inline_trackers(text: &str) -> String {
    inline_re().replace_all(text, "").trim().to_string()
}

/// 为 `last_id`（含）之前最后 N 条带追踪器的非系统消息嵌入内联追踪器；N 为 0 表示全部
pub fn add_inline_trackers(chat: &mut dyn ChatLog, last_id: usize, number_of_messages: usize) -> usize {
    let messages = chat.messages();
    let candidates: Vec<usize> = (0..messages.len().min(last_id.saturating_add(1)))
        .filter(|&i| !is_system_message(messages, i) && messages[i].tracker.is_some())
        .collect();
    let take = if number_of_messages == 0 {
        candidates.len()
    } else {
        number_of_messages.min(candidates.len())
    };

    let mut embedded = 0;
    for idx in &candidates[candidates.len() - take..] {
        if let Some(message) = chat.message_mut(*idx) {
            if embed_inline_tracker(message) {
                embedded += 1;
            }
        }
    }
    embedded
}

/// 取回所有内联追踪器。已有追踪器的消息只移除文本中的块。
pub fn remove_inline_trackers(chat: &mut dyn ChatLog, schema: &TrackerSchema) -> usize {
    let flagged: Vec<usize> = chat
        .messages()
        .iter()
        .enumerate()
        .filter(|(_, m)| m.has_inline_tracker)
        .map(|(i, _)| i)
        .collect();

    for idx in &flagged {
        if let Some(message) = chat.message_mut(*idx) {
            if !extract_inline_tracker(message, schema) {
                message.mes = strip_inline_block(&message.mes);
            }
            message.has_inline_tracker = false;
        }
    }
    flagged.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::InMemoryChat;
    use crate::schema::{FieldDefinition, FieldType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> TrackerSchema {
        TrackerSchema::new()
            .with_field(
                "a",
                FieldDefinition::new("Location", FieldType::String).with_default("<unset>"),
            )
            .with_field(
                "b",
                FieldDefinition::new("Weather", FieldType::String).with_default("<weather>"),
            )
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_strip_inline_trackers() {
        assert_eq!(strip_inline_trackers("<tracker>a</tracker> hi <tracker>b</tracker>"), "hi");
        assert_eq!(strip_inline_trackers("open <tracker> only"), "open <tracker> only");
    }

    #[test]
    fn test_injection_text() {
        let schema = schema();
        assert_eq!(injection_text(None, &schema), "");
        let defaults = record(json!({"Location": "<unset>", "Weather": "<weather>"}));
        assert_eq!(injection_text(Some(&defaults), &schema), "");

        let changed = record(json!({"Location": "Kitchen", "Weather": "<weather>"}));
        assert_eq!(
            injection_text(Some(&changed), &schema),
            "<tracker>\nLocation: \"Kitchen\"\n\n</tracker>"
        );
        assert_eq!(injection_depth(0, 2), 2);
        assert_eq!(injection_depth(4, 2), 4);
    }

    #[test]
    fn test_embed_then_extract() {
        let schema = schema();
        let tracker = record(json!({"Location": "Kitchen", "Weather": "Rain"}));
        let mut message = ChatMessage::character("Emma", "  hello  ").with_tracker(tracker.clone());

        assert!(embed_inline_tracker(&mut message));
        assert_eq!(
            message.mes,
            "<tracker>Location: \"Kitchen\"\nWeather: \"Rain\"\n</tracker>\n\nhello"
        );

        message.tracker = None;
        assert!(extract_inline_tracker(&mut message, &schema));
        assert_eq!(message.mes, "hello");
        assert_eq!(message.tracker, Some(tracker));
    }

    #[test]
    fn test_extract_keeps_existing_tracker() {
        let schema = schema();
        let existing = record(json!({"Location": "Garden"}));
        let mut message = ChatMessage::character("Emma", "<tracker>Location: \"Kitchen\"</tracker> hi")
            .with_tracker(existing.clone());
        assert!(!extract_inline_tracker(&mut message, &schema));
        assert_eq!(message.tracker, Some(existing));
    }

    #[test]
    fn test_add_and_remove_inline_trackers() {
        let schema = schema();
        let tracker = record(json!({"Location": "Kitchen", "Weather": "Rain"}));
        let mut chat = InMemoryChat::new(vec![
            ChatMessage::user("You", "one").with_tracker(tracker.clone()),
            ChatMessage::character("Emma", "two").with_tracker(tracker.clone()),
            ChatMessage::system("three"),
            ChatMessage::character("Emma", "four"),
        ]);

        assert_eq!(add_inline_trackers(&mut chat, 3, 1), 1);
        assert!(!chat.messages[0].has_inline_tracker);
        assert!(chat.messages[1].mes.starts_with("<tracker>"));

        assert_eq!(remove_inline_trackers(&mut chat, &schema), 1);
        assert_eq!(chat.messages[1].mes, "two");
        assert!(!chat.messages[1].has_inline_tracker);

        assert_eq!(add_inline_trackers(&mut chat, 3, 0), 2);
    }
}
