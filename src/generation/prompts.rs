//! 提示组装：把 Schema、聊天上下文与当前追踪器填进预设里的提示模板
//!
//! 所有模板都用提示模式渲染（不转义，未知宏原样保留）。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::chat::inline::strip_inline_trackers;
use crate::chat::{last_message_with_tracker, ChatMessage};
use crate::config::TrackerSettings;
use crate::core::TemplateError;
use crate::format::{OutputFormat, Record};
use crate::reconcile::{get_default_tracker, get_example_trackers, get_tracker, get_tracker_prompt};
use crate::schema::{GenerationMode, IncludeFilter, Preset, TrackerSchema};
use crate::template::render_prompt;

/// 角色卡片：名字与描述（用户一侧的描述即 persona）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CharacterCard {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// 场景中的参与者：用户 + 当前角色（群聊时为所有启用的成员）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneCast {
    pub user: CharacterCard,
    #[serde(default)]
    pub characters: Vec<CharacterCard>,
}

impl SceneCast {
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.user.name.as_str())
            .chain(self.characters.iter().map(|c| c.name.as_str()))
            .collect()
    }
}

/// `A`、`A and B`、`A, B, and C`
pub fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

/// 每个 `<START>…<END>` 块包住一个示例；没有示例时为空串
pub fn tracker_examples(schema: &TrackerSchema, include: IncludeFilter, format: OutputFormat) -> String {
    get_example_trackers(schema, include, format)
        .iter()
        .map(|example| format!("<START>\n<tracker>\n{}\n</tracker>\n<END>", example.to_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 单次生成所需的上下文
pub struct PromptBuilder<'a> {
    pub preset: &'a Preset,
    pub settings: &'a TrackerSettings,
    pub cast: &'a SceneCast,
    pub messages: &'a [ChatMessage],
}

impl<'a> PromptBuilder<'a> {
    fn schema(&self) -> &TrackerSchema {
        &self.preset.tracker_def
    }

    fn format(&self) -> OutputFormat {
        self.settings.tracker_format
    }

    /// 系统提示：`charNames`、`defaultTracker`、`trackerFormat`、`trackerFieldPrompt`
    pub fn system_prompt(&self, template: &str, include: IncludeFilter) -> Result<String, TemplateError> {
        let default_tracker = get_default_tracker(self.schema(), include, self.format()).to_text();
        let vars = json!({
            "charNames": join_names(&self.cast.names()),
            "defaultTracker": default_tracker,
            "trackerFormat": self.format().to_string(),
            "trackerFieldPrompt": get_tracker_prompt(self.schema(), include),
        });
        render_prompt(template, &vars)
    }

    pub fn character_descriptions(&self) -> Result<String, TemplateError> {
        let template = &self.preset.character_description_template;
        let mut cards = Vec::new();
        if !self.cast.user.description.is_empty() {
            cards.push(&self.cast.user);
        }
        cards.extend(self.cast.characters.iter());

        let mut rendered = Vec::new();
        for card in cards {
            let vars = json!({"char": card.name, "charDescription": card.description});
            rendered.push(render_prompt(template, &vars)?);
        }
        Ok(rendered.join("\n\n").trim().to_string())
    }

    /// 目标消息（含）之前最近的非系统消息，每条按模板渲染；去掉文本里的内联追踪器
    pub fn recent_messages(
        &self,
        template: &str,
        idx: usize,
        include: IncludeFilter,
    ) -> Result<String, TemplateError> {
        let candidates: Vec<&ChatMessage> = self
            .messages
            .iter()
            .take(idx.saturating_add(1))
            .filter(|m| !m.is_system)
            .collect();
        let count = self.settings.number_of_messages;
        let start = if count == 0 {
            0
        } else {
            candidates.len().saturating_sub(count)
        };

        let mut rendered = Vec::new();
        for message in &candidates[start..] {
            let tracker = match message.tracker.as_ref().filter(|t| !t.is_empty()) {
                Some(tracker) => {
                    get_tracker(tracker, self.schema(), include, false, self.format()).to_text()
                }
                None => String::new(),
            };
            let vars = json!({
                "char": message.name,
                "message": strip_inline_trackers(&message.mes),
                "tracker": tracker,
            });
            rendered.push(render_prompt(template, &vars)?);
        }
        Ok(rendered.join("\n"))
    }

    /// 目标消息自己的追踪器，其次最近一条带追踪器的消息，最后是默认实例
    pub fn current_tracker(&self, idx: usize, include: IncludeFilter) -> String {
        let own = self
            .messages
            .get(idx)
            .and_then(|m| m.tracker.as_ref())
            .filter(|t| !t.is_empty());
        let source: Option<&Record> = own.or_else(|| {
            last_message_with_tracker(self.messages, idx, self.schema())
                .and_then(|i| self.messages[i].tracker.as_ref())
        });

        match source {
            Some(tracker) => get_tracker(tracker, self.schema(), include, false, self.format()),
            None => get_default_tracker(self.schema(), include, self.format()),
        }
        .to_text()
    }

    /// 生成阶段的系统提示（上下文模板）
    pub fn generate_system_prompt(
        &self,
        idx: usize,
        include: IncludeFilter,
        first_stage_message: Option<&str>,
    ) -> Result<String, TemplateError> {
        let vars = json!({
            "trackerSystemPrompt": self.system_prompt(&self.preset.generate_system_prompt, include)?,
            "characterDescriptions": self.character_descriptions()?,
            "trackerExamples": tracker_examples(self.schema(), include, self.format()),
            "recentMessages": self.recent_messages(&self.preset.generate_recent_messages_template, idx, include)?,
            "currentTracker": self.current_tracker(idx, include),
            "trackerFormat": self.format().to_string(),
            "trackerFieldPrompt": get_tracker_prompt(self.schema(), include),
            "firstStageMessage": first_stage_message.unwrap_or_default(),
        });
        tracing::debug!(idx, "Built tracker generation system prompt");
        render_prompt(&self.preset.generate_context_template, &vars)
    }

    /// 两阶段模式第一步（变更摘要）的系统提示
    pub fn summarization_system_prompt(
        &self,
        idx: usize,
        include: IncludeFilter,
    ) -> Result<String, TemplateError> {
        let summarization = self.system_prompt(&self.preset.message_summarization_system_prompt, include)?;
        let recent_template = &self.preset.message_summarization_recent_messages_template;
        let recent_messages = if recent_template.is_empty() {
            String::new()
        } else {
            self.recent_messages(recent_template, idx, include)?
        };

        let vars = json!({
            "trackerSystemPrompt": summarization,
            "messageSummarizationSystemPrompt": summarization,
            "characterDescriptions": self.character_descriptions()?,
            "trackerExamples": tracker_examples(self.schema(), include, self.format()),
            "recentMessages": recent_messages,
            "currentTracker": self.current_tracker(idx, include),
            "trackerFormat": self.format().to_string(),
            "trackerFieldPrompt": get_tracker_prompt(self.schema(), include),
        });
        tracing::debug!(idx, "Built message summarization system prompt");
        render_prompt(&self.preset.message_summarization_context_template, &vars)
    }

    /// 请求提示：`message`、`trackerFieldPrompt`、`trackerFormat`；两阶段模式另有 `firstStageMessage`
    pub fn request_prompt(
        &self,
        template: &str,
        idx: Option<usize>,
        include: IncludeFilter,
        first_stage_message: Option<&str>,
    ) -> Result<String, TemplateError> {
        let message = idx
            .and_then(|i| self.messages.get(i))
            .map(|m| m.mes.clone())
            .unwrap_or_default();

        let mut vars = json!({
            "message": message,
            "trackerFieldPrompt": get_tracker_prompt(self.schema(), include),
            "trackerFormat": self.format().to_string(),
        });
        if let (GenerationMode::TwoStage, Some(first_stage), Value::Object(map)) =
            (self.settings.generation_mode, first_stage_message, &mut vars)
        {
            map.insert("firstStageMessage".to_string(), Value::String(first_stage.to_string()));
        }
        render_prompt(template, &vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldType};
    use pretty_assertions::assert_eq;

    fn preset() -> Preset {
        Preset {
            name: "test".into(),
            generate_context_template:
                "{{trackerSystemPrompt}}|{{recentMessages}}|{{currentTracker}}|{{firstStageMessage}}".into(),
            generate_system_prompt: "Track {{charNames}} in {{trackerFormat}}:\n{{defaultTracker}}".into(),
            generate_recent_messages_template:
                "{{#if tracker}}[{{tracker}}]{{/if}}{{char}}: {{message}}".into(),
            generate_request_prompt: "{{message}} / {{firstStageMessage}}".into(),
            character_description_template: "### {{char}}\n{{charDescription}}".into(),
            tracker_def: TrackerSchema::new().with_field(
                "a",
                FieldDefinition::new("Location", FieldType::String)
                    .with_default("<unset>")
                    .with_prompt("Where.")
                    .with_examples(["Kitchen"]),
            ),
            ..Preset::default()
        }
    }

    fn cast() -> SceneCast {
        SceneCast {
            user: CharacterCard::new("You", ""),
            characters: vec![CharacterCard::new("Emma", "A baker.")],
        }
    }

    fn settings() -> TrackerSettings {
        TrackerSettings {
            tracker_format: OutputFormat::Yaml,
            number_of_messages: 2,
            ..TrackerSettings::default()
        }
    }

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(&["A"]), "A");
        assert_eq!(join_names(&["A", "B"]), "A and B");
        assert_eq!(join_names(&["A", "B", "C"]), "A, B, and C");
    }

    #[test]
    fn test_tracker_examples_wrapping() {
        let preset = preset();
        assert_eq!(
            tracker_examples(&preset.tracker_def, IncludeFilter::All, OutputFormat::Yaml),
            "<START>\n<tracker>\nLocation: \"Kitchen\"\n\n</tracker>\n<END>"
        );
        assert_eq!(
            tracker_examples(&TrackerSchema::new(), IncludeFilter::All, OutputFormat::Yaml),
            ""
        );
    }

    #[test]
    fn test_generate_system_prompt() {
        let preset = preset();
        let settings = settings();
        let cast = cast();
        let tracker = serde_json::json!({"Location": "Garden"}).as_object().cloned().unwrap();
        let messages = vec![
            ChatMessage::character("Emma", "first"),
            ChatMessage::user("You", "<tracker>x</tracker>second").with_tracker(tracker),
            ChatMessage::system("ignored"),
            ChatMessage::character("Emma", "third"),
        ];
        let builder = PromptBuilder {
            preset: &preset,
            settings: &settings,
            cast: &cast,
            messages: &messages,
        };

        let prompt = builder
            .generate_system_prompt(3, IncludeFilter::Dynamic, None)
            .unwrap();
        assert_eq!(
            prompt,
            "Track You and Emma in YAML:\nLocation: \"<unset>\"\n|[Location: \"Garden\"\n]You: second\nEmma: third|Location: \"Garden\"\n|"
        );
    }

    #[test]
    fn test_character_descriptions_skip_empty_persona() {
        let preset = preset();
        let settings = settings();
        let mut cast = cast();
        let builder = PromptBuilder {
            preset: &preset,
            settings: &settings,
            cast: &cast,
            messages: &[],
        };
        assert_eq!(builder.character_descriptions().unwrap(), "### Emma\nA baker.");

        cast.user.description = "Curious.".into();
        let builder = PromptBuilder {
            preset: &preset,
            settings: &settings,
            cast: &cast,
            messages: &[],
        };
        assert_eq!(
            builder.character_descriptions().unwrap(),
            "### You\nCurious.\n\n### Emma\nA baker."
        );
    }

    #[test]
    fn test_request_prompt_first_stage_only_in_two_stage() {
        let preset = preset();
        let mut settings = settings();
        let cast = cast();
        let messages = vec![ChatMessage::character("Emma", "hello")];
        let builder = PromptBuilder {
            preset: &preset,
            settings: &settings,
            cast: &cast,
            messages: &messages,
        };
        assert_eq!(
            builder
                .request_prompt(&preset.generate_request_prompt, Some(0), IncludeFilter::Dynamic, Some("moved"))
                .unwrap(),
            "hello / {{firstStageMessage}}"
        );

        settings.generation_mode = GenerationMode::TwoStage;
        let builder = PromptBuilder {
            preset: &preset,
            settings: &settings,
            cast: &cast,
            messages: &messages,
        };
        assert_eq!(
            builder
                .request_prompt(&preset.generate_request_prompt, Some(0), IncludeFilter::Dynamic, Some("moved"))
                .unwrap(),
            "hello / moved"
        );
    }
}
