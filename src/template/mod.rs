//! 轻量模板引擎：`{{var}}`、`{{#if}}`、`{{#foreach}}`、`{{#join}}`
//!
//! 同一套语法用于两处：生成提示模板（不转义）与消息展示模板（转义 `<`、`>`）。
//! 缺失变量不报错、非集合的循环整块跳过；只有未配对的块标签会报错。

pub mod eval;
pub mod token;

use serde_json::Value;

use crate::core::TemplateError;
use crate::format::Record;

pub use eval::{Evaluator, RenderMode};
pub use token::{tokenize, Token};

pub fn render(template: &str, data: &Value, mode: RenderMode) -> Result<String, TemplateError> {
    let evaluator = Evaluator::new(data, mode);
    evaluator.process(tokenize(template), &Record::new())
}

pub fn render_prompt(template: &str, data: &Value) -> Result<String, TemplateError> {
    render(template, data, RenderMode::Prompt)
}

pub fn render_display(template: &str, data: &Value) -> Result<String, TemplateError> {
    render(template, data, RenderMode::Display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_if_numeric_comparison() {
        let template = "{{#if score > 5}}High{{/if}}{{#if score <= 5}}Low{{/if}}";
        assert_eq!(render_display(template, &json!({"score": 7})).unwrap(), "High");
        assert_eq!(render_display(template, &json!({"score": 5})).unwrap(), "Low");
    }

    #[test]
    fn test_if_string_comparison_and_missing() {
        let data = json!({"Location": "Kitchen"});
        assert_eq!(
            render_display("{{#if Location == 'Kitchen'}}in{{/if}}", &data).unwrap(),
            "in"
        );
        assert_eq!(
            render_display("{{#if Weather == 'Rain'}}x{{/if}}{{#if Weather != 'Rain'}}y{{/if}}", &data)
                .unwrap(),
            "y"
        );
        assert_eq!(render_display("{{#if Location}}set{{/if}}", &data).unwrap(), "set");
        assert_eq!(render_display("{{#if Weather}}set{{/if}}", &data).unwrap(), "");
    }

    #[test]
    fn test_variables_and_escaping() {
        let data = json!({"Time": "<noon>", "Count": 3, "Scene": {"Mood": "calm"}});
        assert_eq!(
            render_display("{{Time}} {{Count}} {{Scene.Mood}} {{Missing}}|", &data).unwrap(),
            "&lt;noon&gt; 3 calm |"
        );
        assert_eq!(render_prompt("{{Time}}", &data).unwrap(), "<noon>");
        // 提示模式保留宿主宏
        assert_eq!(render_prompt("{{user}} at {{Time}}", &data).unwrap(), "{{user}} at <noon>");
        assert_eq!(
            render_display("{{Scene.Mood | toUpperCase()}}", &data).unwrap(),
            "CALM"
        );
    }

    #[test]
    fn test_foreach_object_entries() {
        let data = json!({
            "Characters": {
                "Emma": {"Hair": "red"},
                "James": {"Hair": "brown"}
            }
        });
        let template =
            "{{#foreach Characters c}}{{c}}({{index}}): {{c.Hair}}; {{/foreach}}";
        assert_eq!(
            render_display(template, &data).unwrap(),
            "Emma(0): red; James(1): brown; "
        );
    }

    #[test]
    fn test_foreach_array_and_nested() {
        let data = json!({
            "Rows": [["a", "b"], ["c"]]
        });
        let template = "{{#foreach Rows row}}[{{#foreach row cell}}{{cell}}{{/foreach}}]{{/foreach}}";
        assert_eq!(render_display(template, &data).unwrap(), "[ab][c]");
    }

    #[test]
    fn test_foreach_skips_non_collection() {
        let data = json!({"Location": "Kitchen"});
        assert_eq!(
            render_display("a{{#foreach Location x}}{{x}}{{/foreach}}b", &data).unwrap(),
            "ab"
        );
    }

    #[test]
    fn test_join() {
        let data = json!({
            "Present": ["Emma", "James"],
            "Topics": {"PrimaryTopic": "Work", "EmotionalTone": "Tense"}
        });
        assert_eq!(
            render_display("{{#join \"; \" Present}} / {{#join ', ' Topics}}", &data).unwrap(),
            "Emma; James / Work, Tense"
        );
        assert_eq!(render_display("{{#join \"; \" Missing}}", &data).unwrap(), "");
    }

    #[test]
    fn test_object_variable_prefers_name() {
        let data = json!({"Hero": {"name": "Emma", "id": 1}, "Thing": {"id": 7}, "Other": {"x": 1}});
        assert_eq!(
            render_display("{{Hero}} {{Thing}} [{{Other}}]", &data).unwrap(),
            "Emma 7 []"
        );
    }

    #[test]
    fn test_unmatched_block_fails() {
        let err = render_display("{{#if a}}never closed", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Unmatched {{#if}}");
        assert!(render_display("{{/if}}stray", &json!({})).is_ok());
    }
}
