//! 应用配置：从 config/scene-tracker.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCENE_TRACKER__*` 覆盖（双下划线表示嵌套，
//! 如 `SCENE_TRACKER__TRACKER__TRACKER_FORMAT=JSON`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::chat::GenerationTarget;
use crate::core::PresetError;
use crate::format::OutputFormat;
use crate::schema::{GenerationMode, Preset, PresetStore, DEFAULT_PRESET};

/// 应用配置根
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub tracker: TrackerSettings,
}

/// [tracker] 段：生成、注入与格式设置
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tracker_format")]
    pub tracker_format: OutputFormat,
    #[serde(default)]
    pub generation_mode: GenerationMode,
    #[serde(default)]
    pub generation_target: GenerationTarget,
    #[serde(default = "default_show_popup_for")]
    pub show_popup_for: GenerationTarget,
    /// 构建提示时取用的最近消息条数；0 表示全部
    #[serde(default = "default_number_of_messages")]
    pub number_of_messages: usize,
    /// 索引小于该值的消息不自动生成
    #[serde(default = "default_generate_from_message")]
    pub generate_from_message: usize,
    #[serde(default)]
    pub minimum_depth: usize,
    /// 响应长度上限；0 表示不设上限
    #[serde(default)]
    pub response_length: u32,
    /// 连接配置；"current" 表示不切换
    #[serde(default = "default_current")]
    pub selected_profile: String,
    #[serde(default = "default_current")]
    pub selected_completion_preset: String,
    #[serde(default = "default_selected_preset")]
    pub selected_preset: String,
    /// 用户预设目录（`<name>.json`）
    pub preset_dir: Option<PathBuf>,
    #[serde(default)]
    pub debug_mode: bool,
    /// 切换连接配置后等待的毫秒数
    #[serde(default = "default_profile_switch_delay_ms")]
    pub profile_switch_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_tracker_format() -> OutputFormat {
    OutputFormat::Yaml
}

fn default_show_popup_for() -> GenerationTarget {
    GenerationTarget::None
}

fn default_number_of_messages() -> usize {
    5
}

fn default_generate_from_message() -> usize {
    3
}

fn default_current() -> String {
    "current".to_string()
}

fn default_selected_preset() -> String {
    DEFAULT_PRESET.to_string()
}

fn default_profile_switch_delay_ms() -> u64 {
    2000
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tracker_format: default_tracker_format(),
            generation_mode: GenerationMode::default(),
            generation_target: GenerationTarget::default(),
            show_popup_for: default_show_popup_for(),
            number_of_messages: default_number_of_messages(),
            generate_from_message: default_generate_from_message(),
            minimum_depth: 0,
            response_length: 0,
            selected_profile: default_current(),
            selected_completion_preset: default_current(),
            selected_preset: default_selected_preset(),
            preset_dir: None,
            debug_mode: false,
            profile_switch_delay_ms: default_profile_switch_delay_ms(),
        }
    }
}

impl TrackerSettings {
    /// 当前选中的预设捆绑
    pub fn active_preset<'a>(&self, store: &'a PresetStore) -> Result<&'a Preset, PresetError> {
        store
            .get(&self.selected_preset)
            .ok_or_else(|| PresetError::NotFound(self.selected_preset.clone()))
    }

    /// 选中预设时带上它保存的生成模式
    pub fn apply_preset(&mut self, preset: &Preset) {
        self.selected_preset = preset.name.clone();
        self.generation_mode = preset.generation_mode;
    }

    /// 用户预设目录加载后的预设存储（含内置预设）
    pub fn preset_store(&self) -> Result<PresetStore, PresetError> {
        let mut store = PresetStore::new();
        if let Some(dir) = &self.preset_dir {
            let loaded = store.load_dir(dir)?;
            tracing::debug!("Loaded {} user presets from {}", loaded, dir.display());
        }
        Ok(store)
    }
}

/// 加载配置，环境变量 SCENE_TRACKER__* 可覆盖
///
/// 1. config/scene-tracker.toml 存在时作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/scene-tracker").required(false));

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCENE_TRACKER")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = TrackerSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.tracker_format, OutputFormat::Yaml);
        assert_eq!(settings.generation_mode, GenerationMode::SingleStage);
        assert_eq!(settings.generation_target, GenerationTarget::Both);
        assert_eq!(settings.show_popup_for, GenerationTarget::None);
        assert_eq!(settings.number_of_messages, 5);
        assert_eq!(settings.generate_from_message, 3);
        assert_eq!(settings.selected_profile, "current");
        assert_eq!(settings.profile_switch_delay_ms, 2000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[tracker]\ntracker_format = \"JSON\"\ngeneration_mode = \"two-stage\"\nnumber_of_messages = 2"
        )
        .unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.tracker.tracker_format, OutputFormat::Json);
        assert_eq!(config.tracker.generation_mode, GenerationMode::TwoStage);
        assert_eq!(config.tracker.number_of_messages, 2);
        assert_eq!(config.tracker.generate_from_message, 3);
    }

    #[test]
    fn test_active_preset() {
        let store = PresetStore::new();
        let mut settings = TrackerSettings::default();
        assert_eq!(settings.active_preset(&store).unwrap().name, DEFAULT_PRESET);

        let two_stage = store.get("Default-TwoStage").unwrap().clone();
        settings.apply_preset(&two_stage);
        assert_eq!(settings.generation_mode, GenerationMode::TwoStage);
        assert_eq!(settings.active_preset(&store).unwrap().name, "Default-TwoStage");

        settings.selected_preset = "missing".into();
        assert!(matches!(
            settings.active_preset(&store),
            Err(PresetError::NotFound(name)) if name == "missing"
        ));
    }
}
