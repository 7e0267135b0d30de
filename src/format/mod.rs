//! 序列化格式：JSON（原生树）与 YAML（结构化文本子集）
//!
//! 每个公开的调和操作都以参数接收格式选择，而不是读全局设置。

pub mod yml;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 追踪器实例：顶层键为字段名，外加可选的保留键 `_extraFields`
pub type Record = Map<String, Value>;

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Yaml => write!(f, "YAML"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JSON" => Ok(Self::Json),
            "YAML" | "YML" => Ok(Self::Yaml),
            other => Err(format!("unknown tracker format: {other}")),
        }
    }
}

/// 调和操作的输入：已解析的记录，或待识别的文本
#[derive(Debug, Clone)]
pub enum TrackerInput {
    Value(Value),
    Text(String),
}

impl TrackerInput {
    /// 归一化为记录。文本以 `{` 开头时先按 JSON 尝试，否则走结构化文本转换器；
    /// 非对象输入视为空记录。
    pub fn into_record(self) -> Record {
        match self {
            Self::Value(Value::Object(map)) => map,
            Self::Value(Value::Null) => Record::new(),
            Self::Value(other) => {
                tracing::warn!("Tracker input is not a record, treating as empty: {}", other);
                Record::new()
            }
            Self::Text(text) => parse_text(&text),
        }
    }
}

fn parse_text(text: &str) -> Record {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Record::new();
    }
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            return map;
        }
    }
    match yml::parse(trimmed) {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

impl From<Value> for TrackerInput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&Value> for TrackerInput {
    fn from(value: &Value) -> Self {
        Self::Value(value.clone())
    }
}

impl From<Record> for TrackerInput {
    fn from(record: Record) -> Self {
        Self::Value(Value::Object(record))
    }
}

impl From<&Record> for TrackerInput {
    fn from(record: &Record) -> Self {
        Self::Value(Value::Object(record.clone()))
    }
}

impl From<&str> for TrackerInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TrackerInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<TrackerOutput> for TrackerInput {
    fn from(output: TrackerOutput) -> Self {
        match output {
            TrackerOutput::Json(record) => Self::Value(Value::Object(record)),
            TrackerOutput::Yaml(text) => Self::Text(text),
        }
    }
}

/// 调和操作的输出，按调用方选择的格式
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOutput {
    Json(Record),
    Yaml(String),
}

impl TrackerOutput {
    pub fn new(record: Record, format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json(record),
            OutputFormat::Yaml => Self::Yaml(yml::serialize(&Value::Object(record))),
        }
    }

    /// 空结果：JSON 为 `{}`，YAML 为空串
    pub fn empty(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json(Record::new()),
            OutputFormat::Yaml => Self::Yaml(String::new()),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Json(record) => Some(record),
            Self::Yaml(_) => None,
        }
    }

    /// 取回记录；YAML 输出会被重新解析
    pub fn into_record(self) -> Record {
        TrackerInput::from(self).into_record()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Json(record) => record.is_empty(),
            Self::Yaml(text) => text.trim().is_empty(),
        }
    }

    /// 文本形式：JSON 美化输出（两空格缩进），YAML 原样
    pub fn to_text(&self) -> String {
        match self {
            Self::Json(record) => serde_json::to_string_pretty(record).unwrap_or_default(),
            Self::Yaml(text) => text.clone(),
        }
    }
}
