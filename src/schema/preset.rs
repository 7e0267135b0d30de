//! 预设：Schema + 提示模板 + 展示模板的命名捆绑
//!
//! 导入/导出的形状与字段定义的递归结构一致；持久化层只是名字 → 捆绑的键值存储，
//! 这里用目录下的 `<name>.json` 文件实现。

use indexmap::IndexMap;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::PresetError;
use crate::schema::defaults;
use crate::schema::TrackerSchema;

/// 生成模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    Inline,
    #[default]
    SingleStage,
    TwoStage,
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(Self::Inline),
            "single-stage" => Ok(Self::SingleStage),
            "two-stage" => Ok(Self::TwoStage),
            other => Err(format!("unknown generation mode: {other}")),
        }
    }
}

/// 预设捆绑
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub generation_mode: GenerationMode,

    #[serde(default)]
    pub generate_context_template: String,
    #[serde(default)]
    pub generate_system_prompt: String,
    #[serde(default)]
    pub generate_request_prompt: String,
    #[serde(default)]
    pub generate_recent_messages_template: String,

    #[serde(default)]
    pub message_summarization_context_template: String,
    #[serde(default)]
    pub message_summarization_system_prompt: String,
    #[serde(default)]
    pub message_summarization_request_prompt: String,
    #[serde(default)]
    pub message_summarization_recent_messages_template: String,

    #[serde(default)]
    pub inline_request_prompt: String,
    #[serde(default)]
    pub character_description_template: String,
    /// 每条消息的展示模板
    #[serde(default)]
    pub mes_tracker_template: String,

    /// 必填：裸 Schema 对象不是合法的预设
    pub tracker_def: TrackerSchema,
}

impl Preset {
    /// 预设捆绑的 JSON Schema，供外部编辑器校验导入文件
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schema_for!(Preset)).unwrap_or_default()
    }
}

/// 预设存储：内置预设 + 用户预设，按插入顺序
#[derive(Debug, Clone)]
pub struct PresetStore {
    presets: IndexMap<String, Preset>,
}

impl Default for PresetStore {
    fn default() -> Self {
        let presets = defaults::builtin_presets()
            .into_iter()
            .map(|preset| (preset.name.clone(), preset))
            .collect();
        Self { presets }
    }
}

impl PresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// 同名覆盖
    pub fn insert(&mut self, mut preset: Preset, name: impl Into<String>) {
        let name = name.into();
        preset.name = name.clone();
        self.presets.insert(name, preset);
    }

    pub fn remove(&mut self, name: &str) -> Result<Preset, PresetError> {
        if defaults::is_builtin(name) {
            return Err(PresetError::BuiltIn(name.to_string()));
        }
        self.presets
            .shift_remove(name)
            .ok_or_else(|| PresetError::NotFound(name.to_string()))
    }

    /// 导出为美化 JSON
    pub fn export(&self, name: &str) -> Result<String, PresetError> {
        let preset = self
            .get(name)
            .ok_or_else(|| PresetError::NotFound(name.to_string()))?;
        Ok(serde_json::to_string_pretty(preset)?)
    }

    /// 导入一个捆绑；名字取自捆绑内的 `name`，缺省时使用 `fallback_name`
    pub fn import(&mut self, text: &str, fallback_name: &str) -> Result<String, PresetError> {
        let preset: Preset = serde_json::from_str(text)?;
        let name = if preset.name.is_empty() {
            fallback_name.to_string()
        } else {
            preset.name.clone()
        };
        tracing::info!("Imported preset {}", name);
        self.insert(preset, name.clone());
        Ok(name)
    }

    /// 从目录加载 `*.json` 预设；目录不存在时返回 0
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, PresetError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
            let text = std::fs::read_to_string(&path)?;
            match self.import(&text, &stem) {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!("Skipping preset file {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    /// 将非内置预设写入目录；父目录不存在时自动创建
    pub fn save_dir(&self, dir: impl AsRef<Path>) -> Result<usize, PresetError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut saved = 0;
        for (name, preset) in &self.presets {
            if defaults::is_builtin(name) {
                continue;
            }
            let path = dir.join(format!("{name}.json"));
            std::fs::write(&path, serde_json::to_string_pretty(preset)?)?;
            saved += 1;
        }
        Ok(saved)
    }
}
