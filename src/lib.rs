//! Scene Tracker - 基于 Schema 的场景追踪器
//!
//! 模块划分：
//! - **schema**: 字段定义、预设捆绑与内置默认值
//! - **format**: JSON / YAML 子集转换
//! - **reconcile**: 默认值、示例、规范化、合并、清理（纯函数，从不失败）
//! - **template**: 提示与展示共用的轻量模板引擎
//! - **generation**: 提示组装、载荷提取、单/两阶段生成编排
//! - **chat**: 消息模型、生成目标判断、待定元数据、内联追踪器
//! - **render**: 只读视图、编辑表单、展示模板与预览登记表
//! - **commands**: 斜杠命令与聊天事件流程
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **llm**: 生成客户端抽象（Mock）
//! - **observability**: tracing 初始化与用户提示

pub mod chat;
pub mod commands;
pub mod config;
pub mod core;
pub mod format;
pub mod generation;
pub mod llm;
pub mod observability;
pub mod reconcile;
pub mod render;
pub mod schema;
pub mod template;

pub use format::{OutputFormat, Record, TrackerOutput};
pub use generation::TrackerGenerator;
pub use schema::{FieldDefinition, FieldType, IncludeFilter, Preset, TrackerSchema};
