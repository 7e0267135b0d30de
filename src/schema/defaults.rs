//! 内置预设与默认场景 Schema（随 crate 打包的 JSON）

use crate::schema::{Preset, TrackerSchema};

const SINGLE_STAGE: &str = include_str!("../../presets/single_stage.json");
const TWO_STAGE: &str = include_str!("../../presets/two_stage.json");
const INLINE: &str = include_str!("../../presets/inline.json");

pub const DEFAULT_PRESET: &str = "Default-SingleStage";

const BUILTIN_NAMES: [&str; 3] = ["Default-SingleStage", "Default-TwoStage", "Default-Inline"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// 解析内置预设；打包数据损坏时记录错误并跳过该预设
pub fn builtin_presets() -> Vec<Preset> {
    [SINGLE_STAGE, TWO_STAGE, INLINE]
        .into_iter()
        .filter_map(|raw| match serde_json::from_str::<Preset>(raw) {
            Ok(preset) => Some(preset),
            Err(e) => {
                tracing::error!("Bundled preset is invalid: {}", e);
                None
            }
        })
        .collect()
}

/// 默认场景 Schema：Time / Location / Weather / Topics / CharactersPresent / Characters
pub fn default_schema() -> TrackerSchema {
    builtin_presets()
        .into_iter()
        .find(|preset| preset.name == DEFAULT_PRESET)
        .map(|preset| preset.tracker_def)
        .unwrap_or_default()
}
