//! 追踪器生成编排
//!
//! 单阶段：组装提示 → 调用生成 → 取 `<tracker>` 载荷 → 与上一个追踪器合并。
//! 两阶段：先生成一段变更摘要（不取载荷），作为 `firstStageMessage` 走单阶段流程。
//! 失败不向上传播：通过 [`Notifier`] 提示用户，返回 `None`，由调用方保留旧追踪器。

use std::sync::Arc;

use crate::chat::{is_system_message, last_message_with_tracker, ChatMessage, GenerationMutex};
use crate::config::TrackerSettings;
use crate::core::{GenerationError, TemplateError};
use crate::format::{OutputFormat, Record};
use crate::generation::extract::parse_generated;
use crate::generation::profile::{
    restore_after_generation, snapshot_selection, switch_for_generation, NoopProfileSwitcher,
    ProfileSwitcher,
};
use crate::generation::prompts::{PromptBuilder, SceneCast};
use crate::llm::{GenerationClient, GenerationRequest};
use crate::observability::{LogNotifier, Notifier};
use crate::reconcile::{default_record, update_tracker};
use crate::schema::{GenerationMode, IncludeFilter, Preset, TrackerSchema};

/// 生成令牌的持有者名
pub const MUTEX_OWNER: &str = "tracker";

pub const GENERATION_FAILED_NOTICE: &str = "Failed to generate tracker. Make sure your selected connection profile and completion preset are valid and working";

pub const PARSE_FAILED_NOTICE: &str = "Failed to parse the generated tracker. Make sure your token count is not low or set the response length override.";

pub struct TrackerGenerator {
    client: Arc<dyn GenerationClient>,
    switcher: Arc<dyn ProfileSwitcher>,
    notifier: Arc<dyn Notifier>,
    mutex: Option<Arc<GenerationMutex>>,
    preset: Preset,
    settings: TrackerSettings,
    cast: SceneCast,
}

impl TrackerGenerator {
    pub fn new(client: Arc<dyn GenerationClient>, preset: Preset, settings: TrackerSettings) -> Self {
        Self {
            client,
            switcher: Arc::new(NoopProfileSwitcher),
            notifier: Arc::new(LogNotifier),
            mutex: None,
            preset,
            settings,
            cast: SceneCast::default(),
        }
    }

    pub fn with_switcher(mut self, switcher: Arc<dyn ProfileSwitcher>) -> Self {
        self.switcher = switcher;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// 与宿主共享生成令牌：令牌被他人持有时跳过本次生成
    pub fn with_mutex(mut self, mutex: Arc<GenerationMutex>) -> Self {
        self.mutex = Some(mutex);
        self
    }

    pub fn with_cast(mut self, cast: SceneCast) -> Self {
        self.cast = cast;
        self
    }

    pub fn schema(&self) -> &TrackerSchema {
        &self.preset.tracker_def
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    fn builder<'a>(&'a self, messages: &'a [ChatMessage]) -> PromptBuilder<'a> {
        PromptBuilder {
            preset: &self.preset,
            settings: &self.settings,
            cast: &self.cast,
            messages,
        }
    }

    /// 内联模式的请求提示，由宿主附加到正常回复的生成请求上
    pub fn inline_prompt(&self, messages: &[ChatMessage]) -> Result<String, TemplateError> {
        self.builder(messages).request_prompt(
            &self.preset.inline_request_prompt,
            None,
            IncludeFilter::Dynamic,
            None,
        )
    }

    /// 以 `idx`（含）之前的上下文生成新追踪器，并合并到最近的已有追踪器上
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        idx: usize,
        include: IncludeFilter,
    ) -> Option<Record> {
        if idx >= messages.len() || is_system_message(messages, idx) {
            tracing::debug!(idx, "No valid message to generate a tracker from");
            return None;
        }
        if self.settings.generation_mode == GenerationMode::Inline {
            tracing::debug!(idx, "Inline mode: tracker comes with the reply, skipping generation");
            return None;
        }

        if let Some(mutex) = &self.mutex {
            if !mutex.capture(MUTEX_OWNER).await {
                tracing::info!(idx, "Another generation is in progress, skipping tracker generation");
                return None;
            }
        }

        let result = self.generate_with_override(messages, idx, include).await;

        if let Some(mutex) = &self.mutex {
            mutex.release().await;
        }

        match result {
            Ok(tracker) => Some(tracker),
            Err(e) if e.is_parse_failure() => {
                tracing::warn!(idx, "Failed to parse generated tracker: {}", e);
                self.notifier.warning(PARSE_FAILED_NOTICE);
                None
            }
            Err(e) => {
                tracing::error!(idx, "Tracker generation failed: {}", e);
                self.notifier.error(GENERATION_FAILED_NOTICE);
                None
            }
        }
    }

    /// 切换配置 → 生成 → 无论成败都恢复
    async fn generate_with_override(
        &self,
        messages: &[ChatMessage],
        idx: usize,
        include: IncludeFilter,
    ) -> Result<Record, GenerationError> {
        let snapshot = snapshot_selection(self.switcher.as_ref())
            .await
            .map_err(|e| GenerationError::Profile(e.to_string()))?;

        let result = match switch_for_generation(self.switcher.as_ref(), &self.settings).await {
            Ok(()) => self.run(messages, idx, include).await,
            Err(e) => Err(GenerationError::Profile(e.to_string())),
        };

        // 切换只完成一半时也要切回
        if let Err(e) =
            restore_after_generation(self.switcher.as_ref(), &snapshot, &self.settings).await
        {
            tracing::warn!("Failed to restore connection profile: {}", e);
        }
        result
    }

    async fn run(
        &self,
        messages: &[ChatMessage],
        idx: usize,
        include: IncludeFilter,
    ) -> Result<Record, GenerationError> {
        tracing::info!(idx, mode = ?self.settings.generation_mode, "Generating tracker");

        let first_stage = match self.settings.generation_mode {
            GenerationMode::TwoStage => Some(self.summarize(messages, idx, include).await?),
            _ => None,
        };

        let builder = self.builder(messages);
        let system_prompt = builder.generate_system_prompt(idx, include, first_stage.as_deref())?;
        let request_prompt = builder.request_prompt(
            &self.preset.generate_request_prompt,
            Some(idx),
            include,
            first_stage.as_deref(),
        )?;

        let request = GenerationRequest::new(system_prompt, request_prompt)
            .with_response_length(self.settings.response_length);
        let text = self.client.generate(&request).await?;
        tracing::debug!(idx, response = %text, "Tracker generation response");

        let generated = parse_generated(&text, self.settings.tracker_format)?;
        let merged = self.merge_with_last(messages, idx, generated);
        tracing::info!(idx, "Tracker generated");
        Ok(merged)
    }

    /// 两阶段的第一步：原样返回模型的摘要文本
    async fn summarize(
        &self,
        messages: &[ChatMessage],
        idx: usize,
        include: IncludeFilter,
    ) -> Result<String, GenerationError> {
        let builder = self.builder(messages);
        let system_prompt = builder.summarization_system_prompt(idx, include)?;
        let request_prompt = builder.request_prompt(
            &self.preset.message_summarization_request_prompt,
            Some(idx),
            include,
            None,
        )?;

        let request = GenerationRequest::new(system_prompt, request_prompt)
            .with_response_length(self.settings.response_length);
        let summary = self.client.generate(&request).await?;
        tracing::debug!(idx, summary = %summary, "First stage summary");
        Ok(summary)
    }

    fn merge_with_last(&self, messages: &[ChatMessage], idx: usize, generated: Record) -> Record {
        let schema = self.schema();
        let last = last_message_with_tracker(messages, idx, schema)
            .and_then(|i| messages[i].tracker.clone())
            .unwrap_or_else(|| default_record(schema, IncludeFilter::All));

        update_tracker(last, generated, schema, true, OutputFormat::Json, true).into_record()
    }
}
