//! 面向宿主 UI 的渲染入口：只读视图、编辑表单、展示模板，以及预览登记表

pub mod editor;
pub mod preview;
pub mod view;

use serde_json::Value;

use crate::core::TemplateError;
use crate::format::Record;
use crate::template::render_display;

pub use editor::{ControlKind, EditorControl, EditorForm};
pub use preview::{EditorHandle, PreviewEvent, PreviewRegistry};
pub use view::{render_view, ViewNode};

/// 用展示模板渲染追踪器（转义 `<`、`>`），外包一层容器 div
pub fn render_template(tracker: &Record, template: &str) -> Result<String, TemplateError> {
    let html = render_display(template, &Value::Object(tracker.clone()))?;
    Ok(format!("<div class=\"tracker-template-container\">{html}</div>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PresetStore, DEFAULT_PRESET};
    use serde_json::json;

    #[test]
    fn test_render_template_wraps_and_escapes() {
        let tracker = json!({"Location": "<b>Kitchen</b>"}).as_object().cloned().unwrap();
        assert_eq!(
            render_template(&tracker, "At {{Location}}").unwrap(),
            "<div class=\"tracker-template-container\">At &lt;b&gt;Kitchen&lt;/b&gt;</div>"
        );
    }

    #[test]
    fn test_default_display_template() {
        let store = PresetStore::new();
        let template = &store.get(DEFAULT_PRESET).unwrap().mes_tracker_template;
        let tracker = json!({
            "Time": "Morning",
            "Topics": {"PrimaryTopic": "Breakfast", "EmotionalTone": "Warm"},
            "CharactersPresent": ["Emma", "James"],
            "Characters": {"Emma": {"Hair": "Red"}}
        });
        let html = render_template(tracker.as_object().unwrap(), template).unwrap();
        assert!(html.contains("<td>Morning</td>"));
        assert!(html.contains("<td>Breakfast; Warm</td>"));
        assert!(html.contains("<td>Emma; James</td>"));
        assert!(html.contains("<strong>Emma:</strong>"));
        assert!(html.contains("<td>Red</td>"));
    }
}
