//! 生成进行中令牌
//!
//! 约定式互斥：持有者可继续，其他调用方应等待或放弃；释放总是成功且不检查持有者。

use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct GenerationMutex {
    owner: RwLock<Option<String>>,
}

impl GenerationMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 空闲或已被同一持有者占用时成功
    pub async fn capture(&self, owner: &str) -> bool {
        let mut current = self.owner.write().await;
        match current.as_deref() {
            Some(existing) if existing != owner => {
                tracing::debug!(owner, held_by = existing, "Generation mutex busy");
                false
            }
            _ => {
                *current = Some(owner.to_string());
                true
            }
        }
    }

    pub async fn release(&self) {
        *self.owner.write().await = None;
    }

    pub async fn captured_by(&self) -> Option<String> {
        self.owner.read().await.clone()
    }
}
