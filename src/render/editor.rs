//! 可编辑表单模型
//!
//! 表单持有追踪器副本，按字段路径（字段名 / 实例键 / 数组下标）修改；宿主 UI 只负责展示控件。

use serde::Serialize;
use serde_json::Value;

use crate::core::EditorError;
use crate::format::Record;
use crate::reconcile::EXTRA_FIELDS_KEY;
use crate::schema::{FieldDefinition, FieldType, TrackerSchema};

/// 控件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Text,
    ListItem,
    AddItem,
    AddKey,
    RemoveKey,
    ExtraFields,
}

/// 一个可编辑控件及其当前值
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorControl {
    pub path: Vec<String>,
    pub kind: ControlKind,
    pub value: String,
}

impl EditorControl {
    fn new(path: Vec<String>, kind: ControlKind, value: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            value: value.into(),
        }
    }
}

pub struct EditorForm {
    schema: TrackerSchema,
    tracker: Record,
}

impl EditorForm {
    pub fn new(tracker: Record, schema: TrackerSchema) -> Self {
        Self { schema, tracker }
    }

    pub fn tracker(&self) -> &Record {
        &self.tracker
    }

    pub fn into_tracker(self) -> Record {
        self.tracker
    }

    /// 写入文本值。双引号会被替换为单引号，返回值表示是否发生了替换（宿主据此提示用户）
    pub fn set_text(&mut self, path: &[&str], text: &str) -> Result<bool, EditorError> {
        let sanitized = text.replace('"', "'");
        let replaced = sanitized != text;

        let (last, parent_path) = path
            .split_last()
            .ok_or_else(|| EditorError::UnknownPath(String::new()))?;
        if parent_path.is_empty() {
            self.tracker.insert(last.to_string(), Value::String(sanitized));
            return Ok(replaced);
        }
        let parent = value_at_mut(&mut self.tracker, parent_path)
            .ok_or_else(|| EditorError::UnknownPath(join_path(parent_path)))?;

        match parent {
            Value::Object(map) => {
                map.insert(last.to_string(), Value::String(sanitized));
            }
            Value::Array(items) => {
                let index = parse_index(path, last)?;
                let slot = items.get_mut(index).ok_or_else(|| EditorError::IndexOutOfRange {
                    path: join_path(parent_path),
                    index,
                })?;
                *slot = Value::String(sanitized);
            }
            _ => return Err(EditorError::UnknownPath(join_path(path))),
        }
        Ok(replaced)
    }

    /// ARRAY 字段追加空串；FOR_EACH_ARRAY 的某个键追加默认条目
    pub fn add_item(&mut self, path: &[&str]) -> Result<(), EditorError> {
        let item = match locate(&self.schema, path) {
            Some((field, 0)) if field.field_type == FieldType::Array => Value::String(String::new()),
            Some((field, 1)) if field.field_type == FieldType::ForEachArray => {
                default_array_item(field)
            }
            _ => return Err(EditorError::NotAList(join_path(path))),
        };

        let target = list_at_mut(&mut self.tracker, path)?;
        target.push(item);
        Ok(())
    }

    pub fn remove_item(&mut self, path: &[&str], index: usize) -> Result<Value, EditorError> {
        match locate(&self.schema, path) {
            Some((field, 0)) if field.field_type == FieldType::Array => {}
            Some((field, 1)) if field.field_type == FieldType::ForEachArray => {}
            _ => return Err(EditorError::NotAList(join_path(path))),
        }

        let target = list_at_mut(&mut self.tracker, path)?;
        if index >= target.len() {
            return Err(EditorError::IndexOutOfRange {
                path: join_path(path),
                index,
            });
        }
        Ok(target.remove(index))
    }

    /// FOR_EACH_* 字段新增实例键：对象实例填入编辑器默认值，数组实例为空数组
    pub fn add_key(&mut self, path: &[&str], key: &str) -> Result<(), EditorError> {
        let seed = match locate(&self.schema, path) {
            Some((field, 0)) if field.field_type == FieldType::ForEachObject => {
                Value::Object(editor_defaults(&field.nested_fields))
            }
            Some((field, 0)) if field.field_type == FieldType::ForEachArray => Value::Array(Vec::new()),
            _ => return Err(EditorError::NotAMap(join_path(path))),
        };

        let map = map_at_mut(&mut self.tracker, path)?;
        if map.contains_key(key) {
            return Err(EditorError::DuplicateKey(key.to_string()));
        }
        map.insert(key.to_string(), seed);
        Ok(())
    }

    pub fn remove_key(&mut self, path: &[&str], key: &str) -> Result<Value, EditorError> {
        match locate(&self.schema, path) {
            Some((field, 0))
                if matches!(field.field_type, FieldType::ForEachObject | FieldType::ForEachArray) => {}
            _ => return Err(EditorError::NotAMap(join_path(path))),
        }

        map_at_mut(&mut self.tracker, path)?
            .shift_remove(key)
            .ok_or_else(|| EditorError::MissingKey(key.to_string()))
    }

    /// 空文本移除 `_extraFields`；能解析为 JSON 则保存解析结果，否则按字符串保存
    pub fn set_extra_fields(&mut self, text: &str) {
        let content = text.trim();
        if content.is_empty() {
            self.tracker.shift_remove(EXTRA_FIELDS_KEY);
            return;
        }
        let value = serde_json::from_str::<Value>(content)
            .unwrap_or_else(|_| Value::String(content.to_string()));
        self.tracker.insert(EXTRA_FIELDS_KEY.to_string(), value);
    }

    /// 按 Schema 顺序列出所有控件；`_extraFields` 存在时附加在最后
    pub fn fields(&self) -> Vec<EditorControl> {
        let mut controls = Vec::new();
        collect_controls(&self.tracker, &self.schema, &mut Vec::new(), &mut controls);

        if let Some(extra) = self.tracker.get(EXTRA_FIELDS_KEY) {
            let text = match extra {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_default(),
            };
            controls.push(EditorControl::new(
                vec![EXTRA_FIELDS_KEY.to_string()],
                ControlKind::ExtraFields,
                text,
            ));
        }
        controls
    }
}

/// 定位路径上最深的 Schema 字段，返回该字段与其后剩余的段数
fn locate<'s>(schema: &'s TrackerSchema, path: &[&str]) -> Option<(&'s FieldDefinition, usize)> {
    let (name, rest) = path.split_first()?;
    let field = schema.field_by_name(name)?;

    let nested_start = match field.field_type {
        FieldType::Object | FieldType::ArrayObject => 0,
        FieldType::ForEachObject => 1,
        FieldType::ForEachArray if !field.is_single_string_shape() => 2,
        _ => return Some((field, rest.len())),
    };
    if rest.len() <= nested_start {
        return Some((field, rest.len()));
    }
    locate(&field.nested_fields, &rest[nested_start..])
}

fn value_at_mut<'v>(record: &'v mut Record, path: &[&str]) -> Option<&'v mut Value> {
    let Some((head, rest)) = path.split_first() else {
        return None;
    };
    let mut value = record.get_mut(*head)?;
    for segment in rest {
        value = match value {
            Value::Object(map) => map.get_mut(*segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// 路径上的数组；值缺失或不是数组时按空数组补齐
fn list_at_mut<'v>(record: &'v mut Record, path: &[&str]) -> Result<&'v mut Vec<Value>, EditorError> {
    let slot = ensure_slot(record, path)?;
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => Ok(items),
        _ => Err(EditorError::NotAList(join_path(path))),
    }
}

fn map_at_mut<'v>(record: &'v mut Record, path: &[&str]) -> Result<&'v mut Record, EditorError> {
    let slot = ensure_slot(record, path)?;
    if !slot.is_object() {
        *slot = Value::Object(Record::new());
    }
    match slot {
        Value::Object(map) => Ok(map),
        _ => Err(EditorError::NotAMap(join_path(path))),
    }
}

/// 父级必须存在；末段缺失时插入 null 占位
fn ensure_slot<'v>(record: &'v mut Record, path: &[&str]) -> Result<&'v mut Value, EditorError> {
    let (last, parent_path) = path
        .split_last()
        .ok_or_else(|| EditorError::UnknownPath(String::new()))?;

    let parent_map = if parent_path.is_empty() {
        record
    } else {
        match value_at_mut(record, parent_path) {
            Some(Value::Object(map)) => map,
            _ => return Err(EditorError::UnknownPath(join_path(parent_path))),
        }
    };
    Ok(parent_map.entry(last.to_string()).or_insert(Value::Null))
}

fn parse_index(path: &[&str], segment: &str) -> Result<usize, EditorError> {
    segment
        .parse::<usize>()
        .map_err(|_| EditorError::UnknownPath(join_path(path)))
}

fn join_path(path: &[&str]) -> String {
    path.join(".")
}

/// 编辑器新建实例时的默认值：STRING 取默认值或空串，ARRAY 为空数组，OBJECT 递归
fn editor_defaults(schema: &TrackerSchema) -> Record {
    schema
        .fields()
        .map(|field| {
            let value = match field.field_type {
                FieldType::Array => Value::Array(Vec::new()),
                FieldType::Object => Value::Object(editor_defaults(&field.nested_fields)),
                _ => Value::String(field.default_value.clone()),
            };
            (field.name.clone(), value)
        })
        .collect()
}

fn default_array_item(field: &FieldDefinition) -> Value {
    if field.is_single_string_shape() {
        Value::String(String::new())
    } else {
        Value::Object(editor_defaults(&field.nested_fields))
    }
}

fn collect_controls(
    object: &Record,
    schema: &TrackerSchema,
    prefix: &mut Vec<String>,
    controls: &mut Vec<EditorControl>,
) {
    for field in schema.fields() {
        prefix.push(field.name.clone());
        let value = object.get(&field.name);

        match field.field_type {
            FieldType::Array => {
                push_list_items(value, prefix, controls);
                controls.push(EditorControl::new(prefix.clone(), ControlKind::AddItem, ""));
            }
            FieldType::Object | FieldType::ArrayObject => {
                collect_controls(&record_of(value), &field.nested_fields, prefix, controls);
            }
            FieldType::ForEachObject => {
                for (key, instance) in record_of(value) {
                    prefix.push(key.clone());
                    collect_controls(&record_of(Some(&instance)), &field.nested_fields, prefix, controls);
                    prefix.pop();
                    controls.push(EditorControl::new(prefix.clone(), ControlKind::RemoveKey, key));
                }
                controls.push(EditorControl::new(prefix.clone(), ControlKind::AddKey, ""));
            }
            FieldType::ForEachArray => {
                let single_string = field.is_single_string_shape();
                for (key, items) in record_of(value) {
                    prefix.push(key.clone());
                    if single_string {
                        push_list_items(Some(&items), prefix, controls);
                    } else if let Value::Array(items) = &items {
                        for (i, item) in items.iter().enumerate() {
                            prefix.push(i.to_string());
                            collect_controls(&record_of(Some(item)), &field.nested_fields, prefix, controls);
                            prefix.pop();
                        }
                    }
                    controls.push(EditorControl::new(prefix.clone(), ControlKind::AddItem, ""));
                    prefix.pop();
                    controls.push(EditorControl::new(prefix.clone(), ControlKind::RemoveKey, key));
                }
                controls.push(EditorControl::new(prefix.clone(), ControlKind::AddKey, ""));
            }
            FieldType::String | FieldType::Unknown => {
                let text = match value {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                controls.push(EditorControl::new(prefix.clone(), ControlKind::Text, text));
            }
        }
        prefix.pop();
    }
}

fn push_list_items(value: Option<&Value>, prefix: &mut Vec<String>, controls: &mut Vec<EditorControl>) {
    let Some(Value::Array(items)) = value else {
        return;
    };
    for (i, item) in items.iter().enumerate() {
        prefix.push(i.to_string());
        let text = match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        controls.push(EditorControl::new(prefix.clone(), ControlKind::ListItem, text));
        prefix.pop();
    }
}

fn record_of(value: Option<&Value>) -> Record {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Record::new(),
    }
}
