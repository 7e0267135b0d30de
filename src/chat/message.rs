//! 聊天消息与消息索引辅助函数

use serde::{Deserialize, Serialize};

use crate::format::Record;
use crate::reconcile::tracker_exists;
use crate::schema::TrackerSchema;

/// 宿主聊天记录中的一条消息（只保留追踪器关心的字段）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub mes: String,
    #[serde(default)]
    pub is_user: bool,
    #[serde(default)]
    pub is_system: bool,
    /// 由其他扩展插入的消息，按系统消息对待
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swipe_id: Option<usize>,
    /// 文本中是否嵌入了内联追踪器
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_inline_tracker: bool,
}

impl ChatMessage {
    pub fn user(name: impl Into<String>, mes: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mes: mes.into(),
            is_user: true,
            ..Default::default()
        }
    }

    pub fn character(name: impl Into<String>, mes: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mes: mes.into(),
            ..Default::default()
        }
    }

    pub fn system(mes: impl Into<String>) -> Self {
        Self {
            name: "System".to_string(),
            mes: mes.into(),
            is_system: true,
            ..Default::default()
        }
    }

    pub fn with_tracker(mut self, tracker: Record) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn is_system_message(&self) -> bool {
        self.is_system || self.owner_extension.is_some()
    }
}

/// 越界索引（例如即将到来的新消息）不算系统消息
pub fn is_system_message(messages: &[ChatMessage], idx: usize) -> bool {
    messages.get(idx).is_some_and(ChatMessage::is_system_message)
}

pub fn last_non_system_index(messages: &[ChatMessage]) -> Option<usize> {
    messages.iter().rposition(|m| !m.is_system_message())
}

pub fn previous_non_system_index(messages: &[ChatMessage], idx: usize) -> Option<usize> {
    (0..idx.min(messages.len()))
        .rev()
        .find(|&i| !messages[i].is_system_message())
}

pub fn next_non_system_index(messages: &[ChatMessage], idx: usize) -> Option<usize> {
    (idx + 1..messages.len()).find(|&i| !messages[i].is_system_message())
}

/// 从 `up_to`（含）向前找第一条带有效追踪器的消息
pub fn last_message_with_tracker(
    messages: &[ChatMessage],
    up_to: usize,
    schema: &TrackerSchema,
) -> Option<usize> {
    if messages.is_empty() {
        return None;
    }
    let start = up_to.min(messages.len() - 1);
    (0..=start)
        .rev()
        .find(|&i| tracker_exists(messages[i].tracker.as_ref(), schema))
}
