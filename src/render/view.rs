//! 只读层级视图：按字段类型把追踪器展开成 `{label, value | children}` 树

use serde::Serialize;
use serde_json::Value;

use crate::format::Record;
use crate::schema::{FieldDefinition, FieldType, TrackerSchema};

const LIST_SEPARATOR: &str = "; ";

/// 视图节点：叶子带 value，分支带 children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewNode {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ViewNode>,
}

impl ViewNode {
    fn leaf(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    fn branch(label: impl Into<String>, children: Vec<ViewNode>) -> Self {
        Self {
            label: label.into(),
            value: None,
            children,
        }
    }

    /// 缩进纯文本，每层两个空格
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        for child in &self.children {
            child.write_lines(0, &mut lines);
        }
        lines.join("\n")
    }

    fn write_lines(&self, depth: usize, lines: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        match &self.value {
            Some(value) if value.is_empty() => lines.push(format!("{indent}{}:", self.label)),
            Some(value) => lines.push(format!("{indent}{}: {value}", self.label)),
            None => lines.push(format!("{indent}{}:", self.label)),
        }
        for child in &self.children {
            child.write_lines(depth + 1, lines);
        }
    }
}

/// 根节点的 label 为空，children 按 Schema 顺序排列
pub fn render_view(tracker: &Record, schema: &TrackerSchema) -> ViewNode {
    ViewNode::branch("", field_nodes(tracker, schema))
}

fn field_nodes(object: &Record, schema: &TrackerSchema) -> Vec<ViewNode> {
    schema
        .fields()
        .map(|field| field_node(field, object.get(&field.name)))
        .collect()
}

fn field_node(field: &FieldDefinition, value: Option<&Value>) -> ViewNode {
    let empty = Record::new();
    let as_record = |value: Option<&Value>| match value {
        Some(Value::Object(map)) => map.clone(),
        _ => empty.clone(),
    };

    match field.field_type {
        FieldType::Array => ViewNode::leaf(&field.name, join_values(value)),
        FieldType::ArrayObject => {
            let values: Vec<Value> = as_record(value).into_iter().map(|(_, v)| v).collect();
            ViewNode::leaf(&field.name, join_values(Some(&Value::Array(values))))
        }
        FieldType::Object => {
            ViewNode::branch(&field.name, field_nodes(&as_record(value), &field.nested_fields))
        }
        FieldType::ForEachObject => {
            let instances = as_record(value)
                .into_iter()
                .map(|(key, instance)| {
                    ViewNode::branch(key, field_nodes(&as_record(Some(&instance)), &field.nested_fields))
                })
                .collect();
            ViewNode::branch(&field.name, instances)
        }
        FieldType::ForEachArray => {
            let single_string = field.is_single_string_shape();
            let entries = as_record(value)
                .into_iter()
                .map(|(key, items)| {
                    if single_string {
                        return ViewNode::leaf(key, join_values(Some(&items)));
                    }
                    let children = match &items {
                        Value::Array(items) => items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| {
                                ViewNode::branch(
                                    format!("[{i}]"),
                                    field_nodes(&as_record(Some(item)), &field.nested_fields),
                                )
                            })
                            .collect(),
                        _ => Vec::new(),
                    };
                    ViewNode::branch(key, children)
                })
                .collect();
            ViewNode::branch(&field.name, entries)
        }
        FieldType::String | FieldType::Unknown => {
            ViewNode::leaf(&field.name, value.map(value_text).unwrap_or_default())
        }
    }
}

/// 非数组值显示为空串
fn join_values(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(value_text)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        _ => String::new(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
