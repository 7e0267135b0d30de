//! `_extraFields` 侧通道：合并与清理

use serde_json::Value;

use crate::format::Record;

/// 保留键名
pub const EXTRA_FIELDS_KEY: &str = "_extraFields";

/// 合并两份额外字段，`incoming` 优先：
/// - 双方都是对象时深度合并；数组并入对象时按下标写成 `"0"`、`"1"`… 键（空对象也一样）
/// - 任一方是文本时拼接（对象一方先转为 JSON 文本；空对象不参与拼接）
/// - `incoming` 缺失时原样返回 `current`
pub fn merge_extra_fields(current: Value, incoming: Option<&Value>) -> Value {
    let Some(incoming) = incoming.filter(|value| !value.is_null()) else {
        return current;
    };

    match (current, incoming) {
        (Value::Object(mut target), Value::Object(source)) => {
            merge_deep(&mut target, source);
            Value::Object(target)
        }
        (Value::Object(mut target), Value::Array(items)) => {
            for (position, item) in items.iter().enumerate() {
                target.insert(position.to_string(), item.clone());
            }
            Value::Object(target)
        }
        (Value::Object(target), other) if target.is_empty() => other.clone(),
        (Value::Object(target), other) => {
            Value::String(format!("{}{}", Value::Object(target), text_of(other)))
        }
        (Value::String(text), other) => Value::String(format!("{}{}", text, text_of(other))),
        (Value::Null, other) => other.clone(),
        (current, other) => Value::String(format!("{}{}", text_of(&current), text_of(other))),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 递归合并普通对象，其余类型直接覆盖
pub fn merge_deep(target: &mut Record, source: &Record) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_deep(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// 自底向上移除清理后为空的对象与数组容器
pub fn prune_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                prune_empty(child);
            }
            map.retain(|_, child| !is_empty_container(child));
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                prune_empty(item);
            }
            items.retain(|item| !is_empty_container(item));
        }
        _ => {}
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// 清理后仍有内容时挂到记录上：非空对象、数组或文本
pub(crate) fn attach_extra_fields(record: &mut Record, mut extras: Value) {
    prune_empty(&mut extras);
    let keep = match &extras {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(_) => true,
        Value::Null => false,
        _ => true,
    };
    if keep {
        record.insert(EXTRA_FIELDS_KEY.to_string(), extras);
    }
}
