//! 连接配置 / 补全预设切换
//!
//! 生成前按设置切换到指定的连接配置与补全预设，结束后（无论成败）切回原来的选择。
//! 设置值为 "current" 时不切换。

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::TrackerSettings;
use crate::core::GenerationError;

/// 不切换的占位值
pub const CURRENT: &str = "current";

/// 宿主的连接配置管理
#[async_trait]
pub trait ProfileSwitcher: Send + Sync {
    async fn current_profile(&self) -> Result<String, GenerationError>;

    async fn current_preset(&self) -> Result<String, GenerationError>;

    async fn switch_profile(&self, name: &str) -> Result<(), GenerationError>;

    async fn switch_preset(&self, name: &str) -> Result<(), GenerationError>;
}

/// 宿主不支持切换时使用：始终停留在当前配置
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfileSwitcher;

#[async_trait]
impl ProfileSwitcher for NoopProfileSwitcher {
    async fn current_profile(&self) -> Result<String, GenerationError> {
        Ok(CURRENT.to_string())
    }

    async fn current_preset(&self) -> Result<String, GenerationError> {
        Ok(CURRENT.to_string())
    }

    async fn switch_profile(&self, _name: &str) -> Result<(), GenerationError> {
        Ok(())
    }

    async fn switch_preset(&self, _name: &str) -> Result<(), GenerationError> {
        Ok(())
    }
}

/// 记录切换历史的实现，用于测试
#[derive(Debug)]
pub struct MockProfileSwitcher {
    profile: Mutex<String>,
    preset: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl MockProfileSwitcher {
    pub fn new(profile: impl Into<String>, preset: impl Into<String>) -> Self {
        Self {
            profile: Mutex::new(profile.into()),
            preset: Mutex::new(preset.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// `profile:<name>` / `preset:<name>`，按切换顺序
    pub async fn history(&self) -> Vec<String> {
        self.history.lock().await.clone()
    }
}

#[async_trait]
impl ProfileSwitcher for MockProfileSwitcher {
    async fn current_profile(&self) -> Result<String, GenerationError> {
        Ok(self.profile.lock().await.clone())
    }

    async fn current_preset(&self) -> Result<String, GenerationError> {
        Ok(self.preset.lock().await.clone())
    }

    async fn switch_profile(&self, name: &str) -> Result<(), GenerationError> {
        *self.profile.lock().await = name.to_string();
        self.history.lock().await.push(format!("profile:{name}"));
        Ok(())
    }

    async fn switch_preset(&self, name: &str) -> Result<(), GenerationError> {
        *self.preset.lock().await = name.to_string();
        self.history.lock().await.push(format!("preset:{name}"));
        Ok(())
    }
}

/// 切换前的选择，用于事后恢复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub profile: String,
    pub preset: String,
}

/// 记下当前选择；必须在任何切换之前调用
pub async fn snapshot_selection(
    switcher: &dyn ProfileSwitcher,
) -> Result<ProfileSnapshot, GenerationError> {
    Ok(ProfileSnapshot {
        profile: switcher.current_profile().await?,
        preset: switcher.current_preset().await?,
    })
}

/// 切换到设置中指定的配置与预设；中途失败时已切换的项保持切换状态，由调用方恢复
pub async fn switch_for_generation(
    switcher: &dyn ProfileSwitcher,
    settings: &TrackerSettings,
) -> Result<(), GenerationError> {
    change_profile_and_preset(
        switcher,
        &settings.selected_profile,
        &settings.selected_completion_preset,
        settings,
    )
    .await
}

/// 恢复生成前的选择；只有生成时确实切换过的项才切回
pub async fn restore_after_generation(
    switcher: &dyn ProfileSwitcher,
    snapshot: &ProfileSnapshot,
    settings: &TrackerSettings,
) -> Result<(), GenerationError> {
    change_profile_and_preset(switcher, &snapshot.profile, &snapshot.preset, settings).await
}

/// 先切配置再切预设；切过配置时在两者都完成后等待连接就绪
async fn change_profile_and_preset(
    switcher: &dyn ProfileSwitcher,
    profile: &str,
    preset: &str,
    settings: &TrackerSettings,
) -> Result<(), GenerationError> {
    let mut profile_switched = false;
    if settings.selected_profile != CURRENT {
        tracing::debug!(profile, "Switching connection profile");
        switcher.switch_profile(profile).await?;
        profile_switched = true;
    }
    if settings.selected_completion_preset != CURRENT {
        tracing::debug!(preset, "Switching completion preset");
        switcher.switch_preset(preset).await?;
    }
    if profile_switched && settings.profile_switch_delay_ms > 0 {
        tracing::debug!(
            delay_ms = settings.profile_switch_delay_ms,
            "Waiting for connection after profile switch"
        );
        tokio::time::sleep(Duration::from_millis(settings.profile_switch_delay_ms)).await;
    }
    Ok(())
}
