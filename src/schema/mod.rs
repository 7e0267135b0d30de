//! Schema：追踪器形状的静态描述、预设捆绑与内置默认值

pub mod defaults;
pub mod field;
pub mod preset;

pub use defaults::{default_schema, DEFAULT_PRESET};
pub use field::{FieldDefinition, FieldType, IncludeFilter, Presence, TrackerSchema};
pub use preset::{GenerationMode, Preset, PresetStore};
