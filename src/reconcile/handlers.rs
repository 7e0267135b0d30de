//! 字段类型处理器
//!
//! 每种字段类型一套策略：推导默认值、推导第 i 个示例、把任意输入调和成该字段声明的形状。
//! 输入形状与声明类型不符时，原始值原样搬到 extra-fields 汇点（以字段名为键，逐实例字段嵌套在实例键下），
//! 输出位置退回 Schema 推导的默认值。

use serde_json::Value;

use crate::format::Record;
use crate::schema::{FieldDefinition, FieldType, IncludeFilter, TrackerSchema};

/// 没有默认值时 STRING 字段与单字符串数组使用的占位文本
pub const PLACEHOLDER: &str = "Updated if Changed";

/// FOR_EACH_* 字段既无示例也无默认值时的实例键
pub const DEFAULT_INSTANCE_KEY: &str = "default";

/// 一次 Schema 遍历的过滤设置
#[derive(Debug, Clone, Copy)]
pub struct Walk {
    pub include: IncludeFilter,
    pub include_ephemeral: bool,
}

impl Walk {
    pub fn new(include: IncludeFilter, include_ephemeral: bool) -> Self {
        Self {
            include,
            include_ephemeral,
        }
    }

    pub fn includes(&self, field: &FieldDefinition) -> bool {
        self.include.includes(field.presence, self.include_ephemeral)
    }
}

/// 处理器分派键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    Scalar,
    List,
    Nested,
    ForEachObject,
    ForEachArray,
}

impl From<FieldType> for Handler {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Array => Self::List,
            FieldType::Object | FieldType::ArrayObject => Self::Nested,
            FieldType::ForEachObject => Self::ForEachObject,
            FieldType::ForEachArray => Self::ForEachArray,
            FieldType::String | FieldType::Unknown => Self::Scalar,
        }
    }
}

pub fn derive_default(field: &FieldDefinition, walk: Walk) -> Value {
    derive(field, walk, None, None)
}

pub fn derive_example(field: &FieldDefinition, walk: Walk, index: usize) -> Value {
    derive(field, walk, Some(index), None)
}

/// `char_index` 是逐实例字段中实例的位置，用来从示例数组里挑出该实例的值
fn derive(
    field: &FieldDefinition,
    walk: Walk,
    index: Option<usize>,
    char_index: Option<usize>,
) -> Value {
    match Handler::from(field.field_type) {
        Handler::Scalar => derive_string(field, index, char_index),
        Handler::List => derive_array(field, index, char_index),
        Handler::Nested => Value::Object(derive_nested(
            &field.nested_fields,
            walk,
            index,
            char_index,
        )),
        Handler::ForEachObject => for_each_object_seed(field, walk, index),
        Handler::ForEachArray => for_each_array_seed(field, walk, index),
    }
}

pub(crate) fn derive_nested(
    schema: &TrackerSchema,
    walk: Walk,
    index: Option<usize>,
    char_index: Option<usize>,
) -> Record {
    schema
        .fields()
        .filter(|field| walk.includes(field))
        .map(|field| (field.name.clone(), derive(field, walk, index, char_index)))
        .collect()
}

fn derive_string(field: &FieldDefinition, index: Option<usize>, char_index: Option<usize>) -> Value {
    let Some(example) = index.and_then(|i| field.example(i)) else {
        return default_string(field);
    };

    match serde_json::from_str::<Value>(example) {
        Ok(Value::Array(items)) => char_index
            .and_then(|c| items.get(c))
            .or_else(|| items.first())
            .cloned()
            .unwrap_or_else(|| default_string(field)),
        _ => Value::String(example.to_string()),
    }
}

fn default_string(field: &FieldDefinition) -> Value {
    if field.default_value.is_empty() {
        Value::String(PLACEHOLDER.to_string())
    } else {
        Value::String(field.default_value.clone())
    }
}

fn derive_array(field: &FieldDefinition, index: Option<usize>, char_index: Option<usize>) -> Value {
    let Some(example) = index.and_then(|i| field.example(i)) else {
        return default_array(field);
    };

    let picked = match serde_json::from_str::<Value>(example) {
        Ok(Value::Array(items)) => match char_index.and_then(|c| items.get(c)) {
            Some(item) => item.clone(),
            None => Value::Array(items),
        },
        Ok(other) => other,
        Err(_) => Value::String(example.to_string()),
    };

    match picked {
        array @ Value::Array(_) => array,
        single => Value::Array(vec![single]),
    }
}

fn default_array(field: &FieldDefinition) -> Value {
    match serde_json::from_str::<Value>(&field.default_value) {
        Ok(array @ Value::Array(_)) => array,
        Ok(single) => Value::Array(vec![single]),
        Err(_) if field.default_value.is_empty() => Value::Array(Vec::new()),
        Err(_) => Value::Array(vec![Value::String(field.default_value.clone())]),
    }
}

/// 实例键：该字段第 index 个示例（JSON 数组）或 `[defaultValue || "default"]`
fn instance_keys(field: &FieldDefinition, index: Option<usize>) -> Vec<String> {
    let parsed = index
        .and_then(|i| field.example(i))
        .and_then(|example| serde_json::from_str::<Value>(example).ok());

    match parsed {
        Some(Value::Array(items)) => items.iter().map(key_text).collect(),
        _ if field.default_value.is_empty() => vec![DEFAULT_INSTANCE_KEY.to_string()],
        _ => vec![field.default_value.clone()],
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn for_each_object_seed(field: &FieldDefinition, walk: Walk, index: Option<usize>) -> Value {
    let instances = instance_keys(field, index)
        .into_iter()
        .enumerate()
        .map(|(position, key)| {
            let instance = derive_nested(&field.nested_fields, walk, index, Some(position));
            (key, Value::Object(instance))
        })
        .collect();
    Value::Object(instances)
}

fn for_each_array_seed(field: &FieldDefinition, walk: Walk, index: Option<usize>) -> Value {
    let single = field.is_single_string_shape();
    let instances = instance_keys(field, index)
        .into_iter()
        .enumerate()
        .map(|(position, key)| {
            let items = match field.nested_fields.fields().next() {
                Some(only) if single => string_array_seed(only, index),
                _ => vec![Value::Object(derive_nested(
                    &field.nested_fields,
                    walk,
                    index,
                    Some(position),
                ))],
            };
            (key, Value::Array(items))
        })
        .collect();
    Value::Object(instances)
}

/// 单字符串形状下每个键的初始数组：嵌套字段的示例或默认值（JSON 数组转字符串数组）
fn string_array_seed(nested: &FieldDefinition, index: Option<usize>) -> Vec<Value> {
    let source = index
        .and_then(|i| nested.example(i))
        .or_else(|| Some(nested.default_value.as_str()).filter(|raw| !raw.is_empty()));

    match source {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items
                .iter()
                .map(|item| Value::String(key_text(item)))
                .collect(),
            _ => vec![Value::String(raw.to_string())],
        },
        None => vec![Value::String(PLACEHOLDER.to_string())],
    }
}

/// 把输入调和为字段声明的形状；不符合的部分写入 `extras`
pub fn reconcile(
    field: &FieldDefinition,
    walk: Walk,
    input: Option<&Value>,
    extras: &mut Record,
) -> Value {
    let input = input.filter(|value| !value.is_null());

    match Handler::from(field.field_type) {
        Handler::Scalar => match input {
            Some(value @ Value::String(_)) => value.clone(),
            Some(other) => {
                relocate(extras, &field.name, other);
                default_string(field)
            }
            None => default_string(field),
        },
        Handler::List => match input {
            Some(value @ Value::Array(_)) => value.clone(),
            Some(other) => {
                relocate(extras, &field.name, other);
                default_array(field)
            }
            None => default_array(field),
        },
        Handler::Nested => match input {
            Some(Value::Object(map)) => {
                let mut nested_extras = Record::new();
                let record = reconcile_nested(&field.nested_fields, walk, map, &mut nested_extras);
                collect_unmatched(map, &record, &mut nested_extras);
                attach_nested(extras, &field.name, nested_extras);
                Value::Object(record)
            }
            other => {
                if let Some(other) = other {
                    relocate(extras, &field.name, other);
                }
                Value::Object(derive_nested(&field.nested_fields, walk, None, None))
            }
        },
        Handler::ForEachObject => match input {
            Some(Value::Object(map)) => reconcile_for_each_object(field, walk, map, extras),
            other => {
                if let Some(other) = other {
                    relocate(extras, &field.name, other);
                }
                for_each_object_seed(field, walk, None)
            }
        },
        Handler::ForEachArray => match input {
            Some(Value::Object(map)) => reconcile_for_each_array(field, walk, map, extras),
            other => {
                if let Some(other) = other {
                    relocate(extras, &field.name, other);
                }
                for_each_array_seed(field, walk, None)
            }
        },
    }
}

/// 对一组字段逐个调和（受过滤器约束）
pub(crate) fn reconcile_nested(
    schema: &TrackerSchema,
    walk: Walk,
    input: &Record,
    extras: &mut Record,
) -> Record {
    schema
        .fields()
        .filter(|field| walk.includes(field))
        .map(|field| {
            let value = reconcile(field, walk, input.get(&field.name), extras);
            (field.name.clone(), value)
        })
        .collect()
}

fn reconcile_for_each_object(
    field: &FieldDefinition,
    walk: Walk,
    input: &Record,
    extras: &mut Record,
) -> Value {
    let mut instances = Record::new();
    let mut field_extras = Record::new();

    for (key, value) in input {
        let instance = match value {
            Value::Object(instance_input) => {
                let mut instance_extras = Record::new();
                let instance =
                    reconcile_nested(&field.nested_fields, walk, instance_input, &mut instance_extras);
                collect_unmatched(instance_input, &instance, &mut instance_extras);
                if !instance_extras.is_empty() {
                    field_extras.insert(key.clone(), Value::Object(instance_extras));
                }
                instance
            }
            other => {
                if !other.is_null() {
                    field_extras.insert(key.clone(), other.clone());
                }
                derive_nested(&field.nested_fields, walk, None, None)
            }
        };
        instances.insert(key.clone(), Value::Object(instance));
    }

    attach_nested(extras, &field.name, field_extras);
    Value::Object(instances)
}

fn reconcile_for_each_array(
    field: &FieldDefinition,
    walk: Walk,
    input: &Record,
    extras: &mut Record,
) -> Value {
    let single = field.is_single_string_shape();
    let mut instances = Record::new();
    let mut field_extras = Record::new();

    for (key, value) in input {
        let Value::Array(items) = value else {
            if !value.is_null() {
                field_extras.insert(key.clone(), value.clone());
            }
            instances.insert(key.clone(), Value::Array(Vec::new()));
            continue;
        };

        let mut rejected = Vec::new();
        let mut kept = Vec::new();
        for item in items {
            match item {
                Value::String(_) if single => kept.push(item.clone()),
                Value::Object(item_input) if !single => {
                    let mut item_extras = Record::new();
                    let record =
                        reconcile_nested(&field.nested_fields, walk, item_input, &mut item_extras);
                    collect_unmatched(item_input, &record, &mut item_extras);
                    if !item_extras.is_empty() {
                        rejected.push(Value::Object(item_extras));
                    }
                    kept.push(Value::Object(record));
                }
                other => rejected.push(other.clone()),
            }
        }

        if !rejected.is_empty() {
            field_extras.insert(key.clone(), Value::Array(rejected));
        }
        instances.insert(key.clone(), Value::Array(kept));
    }

    attach_nested(extras, &field.name, field_extras);
    Value::Object(instances)
}

fn relocate(extras: &mut Record, name: &str, value: &Value) {
    tracing::debug!(field = %name, "Relocating mismatched value to _extraFields");
    extras.insert(name.to_string(), value.clone());
}

/// 输入中没有对应输出键的条目原样收集
pub(crate) fn collect_unmatched(input: &Record, output: &Record, sink: &mut Record) {
    for (key, value) in input {
        if !output.contains_key(key) && !sink.contains_key(key) {
            sink.insert(key.clone(), value.clone());
        }
    }
}

fn attach_nested(extras: &mut Record, name: &str, nested: Record) {
    if nested.is_empty() {
        return;
    }
    match extras.get_mut(name) {
        Some(Value::Object(existing)) => existing.extend(nested),
        _ => {
            extras.insert(name.to_string(), Value::Object(nested));
        }
    }
}
