//! 错误类型
//!
//! 调和引擎与结构化文本转换器从不返回错误：不匹配的数据被搬到 `_extraFields`，
//! 缺失的数据以 Schema 默认值补齐。只有外部边界（模板语法、生成传输、命令参数、预设持久化）会失败。

use thiserror::Error;

/// 模板求值错误：仅块标签缺少对应结束标签时失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unmatched {{{{#{tag}}}}}")]
    Unmatched { tag: String },
}

/// 生成编排错误（传输失败与解析失败需区分，用户提示不同）
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation transport failed: {0}")]
    Transport(String),

    #[error("Failed to parse tracker payload: {0}")]
    Parse(String),

    #[error("No <tracker> block found in generated text")]
    MissingPayload,

    #[error("Profile or preset switch failed: {0}")]
    Profile(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl GenerationError {
    /// 解析类错误（载荷缺失或无法解析）与传输类错误走不同的用户提示
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::MissingPayload)
    }
}

/// 命令层错误：参数非法、消息不存在等
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("No valid message found to generate a tracker.")]
    NoValidMessage,

    #[error("Invalid tracker object provided.")]
    InvalidTracker(String),

    #[error("No tracker found for message {0}.")]
    NoTracker(usize),

    #[error("Message index {0} is out of range.")]
    MessageOutOfRange(usize),

    #[error("Tracker generation failed for message {0}.")]
    GenerationFailed(usize),
}

/// 编辑表单按路径修改追踪器时的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("No editable field at {0}")]
    UnknownPath(String),

    #[error("{0} is not a list")]
    NotAList(String),

    #[error("{0} is not a keyed collection")]
    NotAMap(String),

    #[error("An item with that key already exists: {0}")]
    DuplicateKey(String),

    #[error("No item with key {0}")]
    MissingKey(String),

    #[error("Index {index} is out of range for {path}")]
    IndexOutOfRange { path: String, index: usize },
}

/// 预设导入导出与持久化错误
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("Preset IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preset JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Preset not found: {0}")]
    NotFound(String),

    #[error("Built-in preset cannot be removed: {0}")]
    BuiltIn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_message() {
        let err = TemplateError::Unmatched { tag: "if".into() };
        assert_eq!(err.to_string(), "Unmatched {{#if}}");
    }

    #[test]
    fn test_command_messages() {
        assert_eq!(
            CommandError::NoTracker(4).to_string(),
            "No tracker found for message 4."
        );
        assert_eq!(
            CommandError::InvalidTracker("x".into()).to_string(),
            "Invalid tracker object provided."
        );
    }

    #[test]
    fn test_parse_failure_classification() {
        assert!(GenerationError::MissingPayload.is_parse_failure());
        assert!(GenerationError::Parse("bad".into()).is_parse_failure());
        assert!(!GenerationError::Transport("down".into()).is_parse_failure());
    }
}
