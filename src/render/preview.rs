//! 消息预览登记表
//!
//! 以宿主提供的稳定消息 id 为键（不依赖消息在界面中的位置）。增删改都会产生 [`PreviewEvent`]，
//! 同时推送给所有订阅者。编辑器会话同一时刻最多一个。

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::TemplateError;
use crate::format::Record;
use crate::render::render_template;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PreviewEvent {
    Added { message_id: String, html: String },
    Updated { message_id: String, html: String },
    Removed { message_id: String },
}

/// 打开的编辑器会话凭据；关闭时必须交回
#[derive(Debug, PartialEq, Eq)]
pub struct EditorHandle {
    pub message_id: Option<String>,
    token: u64,
}

pub struct PreviewRegistry {
    template: String,
    previews: IndexMap<String, String>,
    subscribers: Vec<mpsc::UnboundedSender<PreviewEvent>>,
    editor: Option<u64>,
    next_token: u64,
}

impl PreviewRegistry {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            previews: IndexMap::new(),
            subscribers: Vec::new(),
            editor: None,
            next_token: 0,
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PreviewEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn get(&self, message_id: &str) -> Option<&str> {
        self.previews.get(message_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.previews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }

    /// 展示模板变更后，已有预览需逐条 `update`
    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    /// 没有追踪器（或为空）的消息不生成预览；已存在时走更新
    pub fn add(
        &mut self,
        message_id: &str,
        tracker: Option<&Record>,
    ) -> Result<Option<PreviewEvent>, TemplateError> {
        if self.previews.contains_key(message_id) {
            return self.update(message_id, tracker);
        }
        let Some(tracker) = tracker.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let html = render_template(tracker, &self.template)?;
        self.previews.insert(message_id.to_string(), html.clone());
        tracing::debug!(message_id, "Tracker preview added");
        Ok(Some(self.emit(PreviewEvent::Added {
            message_id: message_id.to_string(),
            html,
        })))
    }

    /// 未登记的 id 按新增处理；追踪器被清空时移除预览
    pub fn update(
        &mut self,
        message_id: &str,
        tracker: Option<&Record>,
    ) -> Result<Option<PreviewEvent>, TemplateError> {
        if !self.previews.contains_key(message_id) {
            return self.add(message_id, tracker);
        }
        let Some(tracker) = tracker.filter(|t| !t.is_empty()) else {
            return Ok(self.remove(message_id));
        };

        let html = render_template(tracker, &self.template)?;
        self.previews.insert(message_id.to_string(), html.clone());
        Ok(Some(self.emit(PreviewEvent::Updated {
            message_id: message_id.to_string(),
            html,
        })))
    }

    pub fn remove(&mut self, message_id: &str) -> Option<PreviewEvent> {
        self.previews.shift_remove(message_id)?;
        tracing::debug!(message_id, "Tracker preview removed");
        Some(self.emit(PreviewEvent::Removed {
            message_id: message_id.to_string(),
        }))
    }

    /// 宿主报告当前仍存在的消息 id；其余预览全部移除
    pub fn reindex<'a>(&mut self, live_ids: impl IntoIterator<Item = &'a str>) -> Vec<PreviewEvent> {
        let live: std::collections::HashSet<&str> = live_ids.into_iter().collect();
        let stale: Vec<String> = self
            .previews
            .keys()
            .filter(|id| !live.contains(id.as_str()))
            .cloned()
            .collect();

        tracing::debug!(stale = stale.len(), "Reindexing tracker previews");
        stale.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// 已有会话打开时返回 None
    pub fn open_editor(&mut self, message_id: Option<&str>) -> Option<EditorHandle> {
        if self.editor.is_some() {
            tracing::debug!("Tracker editor already open");
            return None;
        }
        self.next_token += 1;
        self.editor = Some(self.next_token);
        Some(EditorHandle {
            message_id: message_id.map(str::to_string),
            token: self.next_token,
        })
    }

    /// 交回会话凭据；凭据不属于当前会话时返回 false
    pub fn close_editor(&mut self, handle: EditorHandle) -> bool {
        if self.editor == Some(handle.token) {
            self.editor = None;
            true
        } else {
            false
        }
    }

    pub fn editor_open(&self) -> bool {
        self.editor.is_some()
    }

    fn emit(&mut self, event: PreviewEvent) -> PreviewEvent {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracker(location: &str) -> Record {
        json!({"Location": location}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_add_update_remove_events() {
        let mut registry = PreviewRegistry::new("{{Location}}");
        let mut events = registry.subscribe();

        assert_eq!(registry.add("m1", None).unwrap(), None);
        registry.add("m1", Some(&tracker("Kitchen"))).unwrap();
        registry.update("m1", Some(&tracker("Garden"))).unwrap();
        registry.update("m2", Some(&tracker("Attic"))).unwrap();
        registry.update("m2", None).unwrap();

        let wrap = |s: &str| format!("<div class=\"tracker-template-container\">{s}</div>");
        assert_eq!(
            events.recv().await,
            Some(PreviewEvent::Added {
                message_id: "m1".into(),
                html: wrap("Kitchen")
            })
        );
        assert_eq!(
            events.recv().await,
            Some(PreviewEvent::Updated {
                message_id: "m1".into(),
                html: wrap("Garden")
            })
        );
        assert!(matches!(events.recv().await, Some(PreviewEvent::Added { message_id, .. }) if message_id == "m2"));
        assert_eq!(
            events.recv().await,
            Some(PreviewEvent::Removed {
                message_id: "m2".into()
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reindex_drops_missing_messages() {
        let mut registry = PreviewRegistry::new("{{Location}}");
        for id in ["a", "b", "c"] {
            registry.add(id, Some(&tracker(id))).unwrap();
        }
        let removed = registry.reindex(["a", "c"]);
        assert_eq!(
            removed,
            vec![PreviewEvent::Removed {
                message_id: "b".into()
            }]
        );
        assert!(registry.get("b").is_none());
        assert!(registry.get("c").is_some());
    }

    #[test]
    fn test_single_editor_session() {
        let mut registry = PreviewRegistry::new("");
        let first = registry.open_editor(Some("m1")).unwrap();
        assert!(registry.open_editor(None).is_none());

        let stale = EditorHandle {
            message_id: None,
            token: 99,
        };
        assert!(!registry.close_editor(stale));
        assert!(registry.close_editor(first));
        assert!(registry.open_editor(None).is_some());
    }

    #[test]
    fn test_unmatched_template_is_reported() {
        let mut registry = PreviewRegistry::new("{{#if Location}}open");
        assert!(registry.add("m1", Some(&tracker("Kitchen"))).is_err());
        assert!(registry.is_empty());
    }
}
