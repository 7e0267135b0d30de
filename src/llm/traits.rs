//! 生成客户端抽象
//!
//! 给定系统提示、请求提示与可选的响应长度上限，返回模型生成的原始文本。

use async_trait::async_trait;

use crate::core::GenerationError;

/// 一次生成请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    /// 响应长度上限；None 表示沿用宿主当前设置
    pub response_length: Option<u32>,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            response_length: None,
        }
    }

    /// 配置值 0 表示不设上限
    pub fn with_response_length(mut self, response_length: u32) -> Self {
        self.response_length = (response_length > 0).then_some(response_length);
        self
    }
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
