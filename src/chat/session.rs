//! 聊天会话：宿主消息存储接口、生成目标判断、待定追踪器元数据

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chat::message::{is_system_message, ChatMessage};
use crate::config::TrackerSettings;
use crate::core::CommandError;
use crate::format::Record;

/// 宿主提供的消息存储
pub trait ChatLog: Send + Sync {
    fn messages(&self) -> &[ChatMessage];

    fn message_mut(&mut self, idx: usize) -> Option<&mut ChatMessage>;

    fn message(&self, idx: usize) -> Option<&ChatMessage> {
        self.messages().get(idx)
    }

    fn set_tracker(&mut self, idx: usize, tracker: Record) -> Result<(), CommandError> {
        let message = self
            .message_mut(idx)
            .ok_or(CommandError::MessageOutOfRange(idx))?;
        message.tracker = Some(tracker);
        Ok(())
    }

    fn set_text(&mut self, idx: usize, text: String) -> Result<(), CommandError> {
        let message = self
            .message_mut(idx)
            .ok_or(CommandError::MessageOutOfRange(idx))?;
        message.mes = text;
        Ok(())
    }
}

/// 内存中的聊天记录，可选 JSON 文件持久化
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryChat {
    pub messages: Vec<ChatMessage>,
}

impl InMemoryChat {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// 从 JSON 文件加载；文件不存在时返回空记录
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&data)?))
    }

    /// 写入 JSON 文件；父目录不存在时自动创建
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.messages)?)?;
        Ok(())
    }
}

impl ChatLog for InMemoryChat {
    fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    fn message_mut(&mut self, idx: usize) -> Option<&mut ChatMessage> {
        self.messages.get_mut(idx)
    }
}

/// 哪一方的消息需要追踪器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationTarget {
    #[default]
    Both,
    User,
    Character,
    None,
}

impl GenerationTarget {
    fn accepts(self, required: GenerationTarget) -> bool {
        self == required || self == Self::Both
    }
}

/// 宿主触发生成的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    #[default]
    Normal,
    Impersonate,
    Continue,
    Regenerate,
    Swipe,
    Quiet,
}

impl std::str::FromStr for GenerationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "" => Ok(Self::Normal),
            "impersonate" => Ok(Self::Impersonate),
            "continue" => Ok(Self::Continue),
            "regenerate" => Ok(Self::Regenerate),
            "swipe" => Ok(Self::Swipe),
            "quiet" => Ok(Self::Quiet),
            other => Err(format!("unknown generation type: {other}")),
        }
    }
}

/// 按生成方式与消息作者推导需要的一方；None 表示不生成
fn required_target(message: Option<&ChatMessage>, kind: GenerationKind) -> Option<GenerationTarget> {
    let author = if message.is_some_and(|m| m.is_user) {
        GenerationTarget::User
    } else {
        GenerationTarget::Character
    };

    match kind {
        GenerationKind::Impersonate => Some(GenerationTarget::User),
        GenerationKind::Swipe if author == GenerationTarget::User => None,
        GenerationKind::Swipe => Some(GenerationTarget::Character),
        _ => Some(author),
    }
}

pub fn should_generate_tracker(
    messages: &[ChatMessage],
    idx: usize,
    kind: GenerationKind,
    settings: &TrackerSettings,
) -> bool {
    if is_system_message(messages, idx) {
        return false;
    }
    let target = settings.generation_target;
    if target == GenerationTarget::None || idx < settings.generate_from_message {
        return false;
    }

    let required = required_target(messages.get(idx), kind);
    tracing::debug!(idx, ?kind, ?required, ?target, "Checking tracker generation target");
    required.is_some_and(|required| target.accepts(required))
}

/// 与生成判断相同的规则，但使用 `show_popup_for` 且没有起始消息下限
pub fn should_show_popup(
    messages: &[ChatMessage],
    idx: usize,
    kind: GenerationKind,
    settings: &TrackerSettings,
) -> bool {
    if is_system_message(messages, idx) {
        return false;
    }
    let target = settings.show_popup_for;
    if target == GenerationTarget::None {
        return false;
    }
    required_target(messages.get(idx), kind).is_some_and(|required| target.accepts(required))
}

/// 聊天级元数据：尚未挂到消息上的待定追踪器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub temp_tracker_id: Option<usize>,
    pub temp_tracker: Option<Record>,
    pub cmd_tracker_override: Option<Record>,
}

impl ChatMetadata {
    pub fn stage_pending(&mut self, message_id: usize, tracker: Record) {
        self.temp_tracker_id = Some(message_id);
        self.temp_tracker = Some(tracker);
    }

    /// 只有 id 匹配时才交出待定追踪器；无论是否匹配都清空
    pub fn take_pending_for(&mut self, message_id: usize) -> Option<Record> {
        let staged_for = self.temp_tracker_id.take();
        let tracker = self.temp_tracker.take();
        if staged_for == Some(message_id) {
            tracker
        } else {
            None
        }
    }

    pub fn take_override(&mut self) -> Option<Record> {
        self.cmd_tracker_override.take()
    }
}
