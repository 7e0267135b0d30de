//! 命令边界：宿主斜杠命令与聊天事件流程
//!
//! 参数校验失败以 [`CommandError`] 返回描述性错误；调和引擎本身不做命令校验。

use serde_json::Value;

use crate::chat::inline::{extract_inline_tracker, injection_depth, injection_text, remove_inline_trackers};
use crate::chat::{
    is_system_message, last_message_with_tracker, next_non_system_index, last_non_system_index, previous_non_system_index,
    should_generate_tracker, ChatLog, ChatMetadata, GenerationKind,
};
use crate::config::TrackerSettings;
use crate::core::CommandError;
use crate::format::{OutputFormat, Record};
use crate::generation::TrackerGenerator;
use crate::reconcile::{get_tracker, tracker_exists, update_tracker};
use crate::schema::{GenerationMode, IncludeFilter, TrackerSchema};

fn parse_tracker(text: &str) -> Result<Record, CommandError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CommandError::InvalidTracker(format!("expected an object, got {other}"))),
        Err(e) => Err(CommandError::InvalidTracker(e.to_string())),
    }
}

fn resolve_index(chat: &dyn ChatLog, idx: Option<usize>) -> Result<usize, CommandError> {
    match idx {
        Some(idx) if idx < chat.messages().len() => Ok(idx),
        Some(idx) => Err(CommandError::MessageOutOfRange(idx)),
        None => last_non_system_index(chat.messages()).ok_or(CommandError::NoValidMessage),
    }
}

/// 为消息生成追踪器（上下文截止到它之前的最后一条非系统消息）；未知的 include 取 DYNAMIC
pub async fn generate_tracker_command(
    chat: &dyn ChatLog,
    generator: &TrackerGenerator,
    idx: Option<usize>,
    include: Option<&str>,
) -> Result<Record, CommandError> {
    let mes_id = resolve_index(chat, idx)?;
    let include = include
        .and_then(|s| s.parse::<IncludeFilter>().ok())
        .unwrap_or(IncludeFilter::Dynamic);

    let previous = previous_non_system_index(chat.messages(), mes_id).ok_or(CommandError::NoValidMessage)?;
    tracing::debug!(mes_id, previous, "Generating tracker from command");

    generator
        .generate(chat.messages(), previous, include)
        .await
        .ok_or(CommandError::GenerationFailed(mes_id))
}

/// 暂存一个追踪器，下一次生成时代替自动生成的结果
pub fn tracker_override_command(metadata: &mut ChatMetadata, text: &str) -> Result<Record, CommandError> {
    let tracker = parse_tracker(text)?;
    metadata.cmd_tracker_override = Some(tracker.clone());
    Ok(tracker)
}

pub fn save_tracker_to_message_command(
    chat: &mut dyn ChatLog,
    schema: &TrackerSchema,
    idx: Option<usize>,
    text: &str,
) -> Result<Record, CommandError> {
    let mes_id = resolve_index(chat, idx)?;
    let tracker = parse_tracker(text)?;
    save_tracker(chat, schema, mes_id, tracker, false)
}

/// 把追踪器合并到消息已有的追踪器上并保存
pub fn save_tracker(
    chat: &mut dyn ChatLog,
    schema: &TrackerSchema,
    idx: usize,
    tracker: Record,
    prefer_new_extra_fields: bool,
) -> Result<Record, CommandError> {
    let message = chat.message(idx).ok_or(CommandError::MessageOutOfRange(idx))?;
    let original = get_tracker(
        message.tracker.clone().unwrap_or_default(),
        schema,
        IncludeFilter::All,
        true,
        OutputFormat::Json,
    );
    let updated = update_tracker(
        original,
        tracker,
        schema,
        true,
        OutputFormat::Json,
        prefer_new_extra_fields,
    )
    .into_record();

    chat.set_tracker(idx, updated.clone())?;
    tracing::debug!(idx, "Tracker saved to message");
    Ok(updated)
}

/// 消息追踪器的规范化 JSON
pub fn get_tracker_command(
    chat: &dyn ChatLog,
    schema: &TrackerSchema,
    idx: Option<usize>,
) -> Result<String, CommandError> {
    let mes_id = resolve_index(chat, idx)?;
    let raw = chat
        .message(mes_id)
        .and_then(|m| m.tracker.clone())
        .ok_or(CommandError::NoTracker(mes_id))?;

    let tracker = get_tracker(raw, schema, IncludeFilter::All, true, OutputFormat::Json).into_record();
    Ok(Value::Object(tracker).to_string())
}

/// 查询或切换启用状态：`enabled` 为 "true"/"false"（大小写不敏感）时先切换
pub fn state_tracker_command(settings: &mut TrackerSettings, enabled: Option<&str>) -> bool {
    if let Some(enabled) = enabled.filter(|s| !s.is_empty()) {
        settings.enabled = enabled.eq_ignore_ascii_case("true");
        tracing::info!(enabled = settings.enabled, "Tracker state changed");
    }
    settings.enabled
}

/// 注入到下一次回复生成中的追踪器文本及深度
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Injection {
    pub text: String,
    pub depth: usize,
}

/// 回复生成前：按生成方式决定要注入的追踪器，必要时先生成并暂存为待定追踪器
pub async fn prepare_injection(
    chat: &mut dyn ChatLog,
    metadata: &mut ChatMetadata,
    generator: &TrackerGenerator,
    kind: GenerationKind,
) -> Result<Injection, CommandError> {
    let settings = generator.settings();
    let schema = generator.schema();
    metadata.temp_tracker_id = None;
    metadata.temp_tracker = None;

    let Some(mes_id) = last_non_system_index(chat.messages()) else {
        return Ok(Injection::default());
    };

    let mut tracker: Option<Record> = None;
    let mut position = 0;

    if matches!(
        kind,
        GenerationKind::Continue | GenerationKind::Swipe | GenerationKind::Regenerate
    ) {
        let current = chat.message(mes_id).and_then(|m| m.tracker.clone());
        let has_tracker = tracker_exists(current.as_ref(), schema);

        tracker = current.filter(|_| has_tracker);
        if !has_tracker && should_generate_tracker(chat.messages(), mes_id, kind, settings) {
            if let Some(previous) = previous_non_system_index(chat.messages(), mes_id) {
                let generated = generator
                    .generate(chat.messages(), previous, IncludeFilter::Dynamic)
                    .await;
                if let Some(generated) = generated {
                    chat.set_tracker(mes_id, generated.clone())?;
                    tracker = Some(generated);
                }
            }
        }
        if kind == GenerationKind::Regenerate && has_tracker {
            if let Some(existing) = &tracker {
                metadata.stage_pending(mes_id, existing.clone());
            }
        }
    } else {
        if let Some(overridden) = metadata.take_override() {
            tracker = Some(overridden);
        } else if should_generate_tracker(chat.messages(), mes_id + 1, kind, settings) {
            tracing::debug!(mes_id, "Generating tracker for the upcoming message");
            tracker = generator.generate(chat.messages(), mes_id, IncludeFilter::Dynamic).await;
        }
        if let Some(pending) = &tracker {
            metadata.stage_pending(mes_id + 1, pending.clone());
        }
    }

    if tracker.is_none() {
        if let Some(last) = last_message_with_tracker(chat.messages(), mes_id, schema) {
            let raw = chat.message(last).and_then(|m| m.tracker.clone()).unwrap_or_default();
            tracker = Some(get_tracker(raw, schema, IncludeFilter::All, true, OutputFormat::Json).into_record());
            position = chat.messages().len() - 1 - last;
        }
    }

    Ok(Injection {
        text: injection_text(tracker.as_ref(), schema),
        depth: injection_depth(position, settings.minimum_depth),
    })
}

/// 新消息写入后：挂上命令覆盖或待定追踪器，否则按设置补生成。内联模式改为从文本中取回。
pub async fn add_tracker_to_message(
    chat: &mut dyn ChatLog,
    metadata: &mut ChatMetadata,
    generator: &TrackerGenerator,
    mes_id: usize,
) -> Result<Option<Record>, CommandError> {
    let schema = generator.schema();
    if chat.message(mes_id).is_none() {
        return Err(CommandError::MessageOutOfRange(mes_id));
    }

    if generator.settings().generation_mode == GenerationMode::Inline {
        let mut attached = None;
        if let Some(message) = chat.message_mut(mes_id) {
            if extract_inline_tracker(message, schema) {
                attached = message.tracker.clone();
            }
        }
        remove_inline_trackers(chat, schema);
        return Ok(attached);
    }

    let tracker = if let Some(overridden) = metadata.take_override() {
        metadata.take_pending_for(mes_id);
        Some(overridden)
    } else if let Some(staged_for) = metadata.temp_tracker_id {
        // 暂存在系统消息上的追踪器归属其后的第一条非系统消息
        let owner = if is_system_message(chat.messages(), staged_for) {
            next_non_system_index(chat.messages(), staged_for)
        } else {
            Some(staged_for)
        };
        let pending = metadata.take_pending_for(staged_for);
        pending.filter(|_| owner == Some(mes_id))
    } else {
        match previous_non_system_index(chat.messages(), mes_id) {
            Some(previous)
                if should_generate_tracker(
                    chat.messages(),
                    mes_id,
                    GenerationKind::Normal,
                    generator.settings(),
                ) =>
            {
                tracing::debug!(mes_id, "Generating for message with missing tracker");
                generator.generate(chat.messages(), previous, IncludeFilter::Dynamic).await
            }
            _ => None,
        }
    };

    if let Some(tracker) = &tracker {
        chat.set_tracker(mes_id, tracker.clone())?;
    }
    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMessage, GenerationTarget, InMemoryChat};
    use crate::llm::MockGenerationClient;
    use crate::schema::{FieldDefinition, FieldType, Preset};
    use std::sync::Arc;
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

    fn chat() -> InMemoryChat {
        InMemoryChat::new(vec![
            ChatMessage::user("You", "hi").with_tracker(record(json!({"Location": "Garden", "Weather": "Sunny"}))),
            ChatMessage::character("Emma", "hello"),
            ChatMessage::system("note"),
        ])
    }

    #[test]
    fn test_override_rejects_non_objects() {
        let mut metadata = ChatMetadata::default();
        assert!(matches!(
            tracker_override_command(&mut metadata, "[1]"),
            Err(CommandError::InvalidTracker(_))
        ));
        assert!(matches!(
            tracker_override_command(&mut metadata, "{oops"),
            Err(CommandError::InvalidTracker(_))
        ));

        let tracker = tracker_override_command(&mut metadata, r#"{"Location": "Attic"}"#).unwrap();
        assert_eq!(metadata.cmd_tracker_override, Some(tracker));
    }

    #[test]
    fn test_save_tracker_merges_with_existing() {
        let mut chat = chat();
        let saved = save_tracker_to_message_command(
            &mut chat,
            &schema(),
            Some(0),
            r#"{"Weather": "Rain", "Mood": "calm"}"#,
        )
        .unwrap();
        assert_eq!(
            Value::Object(saved.clone()),
            json!({"Location": "Garden", "Weather": "Rain", "_extraFields": {"Mood": "calm"}})
        );
        assert_eq!(chat.messages[0].tracker, Some(saved));
    }

    #[test]
    fn test_get_tracker_command() {
        let chat = chat();
        assert_eq!(
            get_tracker_command(&chat, &schema(), Some(0)).unwrap(),
            r#"{"Location":"Garden","Weather":"Sunny"}"#
        );
        assert!(matches!(
            get_tracker_command(&chat, &schema(), None),
            Err(CommandError::NoTracker(1))
        ));
        assert!(matches!(
            get_tracker_command(&chat, &schema(), Some(7)),
            Err(CommandError::MessageOutOfRange(7))
        ));
    }

    fn generator(responses: &[&str], settings: TrackerSettings) -> (Arc<MockGenerationClient>, TrackerGenerator) {
        let client = Arc::new(MockGenerationClient::with_responses(responses.iter().copied()));
        let preset = Preset {
            generate_context_template: "{{trackerSystemPrompt}}\n{{currentTracker}}".into(),
            generate_request_prompt: "Update for: {{message}}".into(),
            generate_recent_messages_template: "{{char}}: {{message}}".into(),
            tracker_def: schema(),
            ..Preset::default()
        };
        let generator = TrackerGenerator::new(client.clone(), preset, settings);
        (client, generator)
    }

    fn settings() -> TrackerSettings {
        TrackerSettings {
            generation_mode: GenerationMode::SingleStage,
            tracker_format: OutputFormat::Json,
            generate_from_message: 0,
            profile_switch_delay_ms: 0,
            ..TrackerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_generate_command_does_not_save() {
        let chat = chat();
        let (client, generator) = generator(&["<tracker>{\"Weather\": \"Rain\"}</tracker>"], settings());

        let tracker = generate_tracker_command(&chat, &generator, Some(1), Some("bogus"))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(tracker),
            json!({"Location": "Garden", "Weather": "Rain"})
        );
        assert_eq!(client.requests().await.len(), 1);
        assert!(chat.messages[1].tracker.is_none());

        assert!(matches!(
            generate_tracker_command(&chat, &generator, Some(0), None).await,
            Err(CommandError::NoValidMessage)
        ));
        assert!(matches!(
            generate_tracker_command(&chat, &generator, Some(1), None).await,
            Err(CommandError::GenerationFailed(1))
        ));
    }

    #[tokio::test]
    async fn test_prepare_injection_stages_pending_tracker() {
        let mut chat = chat();
        chat.messages.truncate(2);
        let mut metadata = ChatMetadata::default();
        let (_, generator) = generator(&["<tracker>{\"Location\": \"Kitchen\"}</tracker>"], settings());

        let injection = prepare_injection(&mut chat, &mut metadata, &generator, GenerationKind::Normal)
            .await
            .unwrap();
        assert!(injection.text.starts_with("<tracker>\n"));
        assert!(injection.text.contains("Location: \"Kitchen\""));
        assert_eq!(injection.depth, 0);
        assert_eq!(metadata.temp_tracker_id, Some(2));

        // 索引 2 落成了系统消息，待定追踪器归属其后的回复
        chat.push(ChatMessage::system("narration"));
        chat.push(ChatMessage::character("Emma", "Breakfast is ready."));
        let saved = add_tracker_to_message(&mut chat, &mut metadata, &generator, 3)
            .await
            .unwrap();
        assert_eq!(
            saved.clone().map(Value::Object),
            Some(json!({"Location": "Kitchen", "Weather": "Sunny"}))
        );
        assert_eq!(chat.messages[3].tracker, saved);
        assert_eq!(metadata, ChatMetadata::default());
    }

    #[tokio::test]
    async fn test_prepare_injection_falls_back_to_last_tracker() {
        let mut chat = chat();
        let mut metadata = ChatMetadata::default();
        let disabled = TrackerSettings {
            generation_target: GenerationTarget::None,
            minimum_depth: 1,
            ..settings()
        };
        let (client, generator) = generator(&[], disabled);

        let injection = prepare_injection(&mut chat, &mut metadata, &generator, GenerationKind::Normal)
            .await
            .unwrap();
        assert!(injection.text.contains("Location: \"Garden\""));
        assert_eq!(injection.depth, 2);
        assert!(client.requests().await.is_empty());
        assert_eq!(metadata.temp_tracker_id, None);
    }

    #[tokio::test]
    async fn test_override_wins_over_generation() {
        let mut chat = chat();
        let mut metadata = ChatMetadata::default();
        let (client, generator) = generator(&[], settings());
        tracker_override_command(&mut metadata, r#"{"Location": "Attic"}"#).unwrap();

        let injection = prepare_injection(&mut chat, &mut metadata, &generator, GenerationKind::Normal)
            .await
            .unwrap();
        assert!(injection.text.contains("Location: \"Attic\""));
        assert!(client.requests().await.is_empty());
        assert_eq!(metadata.cmd_tracker_override, None);
    }

    #[tokio::test]
    async fn test_inline_mode_extracts_from_text() {
        let mut chat = chat();
        chat.push(ChatMessage::character(
            "Emma",
            "<tracker>{\"Location\": \"Porch\"}</tracker>\nShe steps outside.",
        ));
        let mut metadata = ChatMetadata::default();
        let inline = TrackerSettings {
            generation_mode: GenerationMode::Inline,
            ..settings()
        };
        let (client, generator) = generator(&[], inline);

        let tracker = add_tracker_to_message(&mut chat, &mut metadata, &generator, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.get("Location"), Some(&json!("Porch")));
        assert_eq!(chat.messages[3].mes, "She steps outside.");
        assert!(client.requests().await.is_empty());
    }

    #[test]
    fn test_state_tracker_command() {
        let mut settings = TrackerSettings::default();
        assert!(state_tracker_command(&mut settings, None));
        assert!(!state_tracker_command(&mut settings, Some("FALSE")));
        assert!(!state_tracker_command(&mut settings, Some("")));
        assert!(state_tracker_command(&mut settings, Some("true")));
    }
}
