//! 默认值清理与存在性判断

use serde_json::Value;

use crate::format::{OutputFormat, Record, TrackerInput, TrackerOutput};
use crate::reconcile::engine::default_record;
use crate::schema::{IncludeFilter, TrackerSchema};

/// 删除与完整默认实例深度相等的部分。
///
/// `preserve_structure` 为 true 时被删除的值替换为同类型的空值（`""`、`[]`、`{}`、`null`），
/// 结构保持不变；否则直接移除，空容器一并移除。全部被移除时 JSON 返回 `{}`，YAML 返回空串。
pub fn clean_tracker(
    input: impl Into<TrackerInput>,
    schema: &TrackerSchema,
    format: OutputFormat,
    preserve_structure: bool,
) -> TrackerOutput {
    let record = input.into().into_record();
    let defaults = default_record(schema, IncludeFilter::All);

    match clean_record(&record, &defaults, preserve_structure) {
        Some(cleaned) => TrackerOutput::new(cleaned, format),
        None => TrackerOutput::empty(format),
    }
}

/// `None` 表示该值整体被移除
fn remove_defaults(value: &Value, default: &Value, preserve: bool) -> Option<Value> {
    match (value, default) {
        (Value::Array(items), Value::Array(defaults)) => {
            let kept: Vec<Value> = items
                .iter()
                .filter(|item| !defaults.contains(item))
                .cloned()
                .collect();
            if kept.is_empty() && !preserve {
                None
            } else {
                Some(Value::Array(kept))
            }
        }
        (Value::Object(map), Value::Object(defaults)) => {
            clean_record(map, defaults, preserve).map(Value::Object)
        }
        _ if value == default => preserve.then(|| empty_like(value)),
        _ => Some(value.clone()),
    }
}

fn clean_record(record: &Record, defaults: &Record, preserve: bool) -> Option<Record> {
    let mut cleaned = Record::new();
    for (key, value) in record {
        let fallback;
        let default = match defaults.get(key) {
            Some(default) => default,
            None => {
                fallback = empty_like(value);
                &fallback
            }
        };
        match remove_defaults(value, default, preserve) {
            Some(kept) => {
                cleaned.insert(key.clone(), kept);
            }
            None if preserve => {
                cleaned.insert(key.clone(), empty_like(value));
            }
            None => {}
        }
    }

    if cleaned.is_empty() && !preserve {
        None
    } else {
        Some(cleaned)
    }
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::String(_) => Value::String(String::new()),
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => Value::Object(Record::new()),
        _ => Value::Null,
    }
}

/// 实例是否包含默认值以外的内容。
///
/// 顶层的空值（`null`、`""`、`[]`、`{}`）先从实例和完整默认实例中剔除，
/// 剩余为空或与默认实例深度相等时返回 false。
pub fn tracker_exists(tracker: Option<&Record>, schema: &TrackerSchema) -> bool {
    let Some(tracker) = tracker else {
        return false;
    };

    let present = without_empty(tracker);
    if present.is_empty() {
        return false;
    }

    present != without_empty(&default_record(schema, IncludeFilter::All))
}

fn without_empty(record: &Record) -> Record {
    record
        .iter()
        .filter(|(_, value)| !is_empty_value(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
