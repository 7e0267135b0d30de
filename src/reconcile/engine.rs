//! 调和引擎：以 Schema 驱动的树遍历实现默认值、示例、规范化、合并与提示生成
//!
//! 所有操作都是纯函数：实例按值进出，Schema 只读，可在任意调用点并发使用。

use serde_json::Value;

use crate::format::{OutputFormat, Record, TrackerInput, TrackerOutput};
use crate::reconcile::extra::{attach_extra_fields, merge_extra_fields, EXTRA_FIELDS_KEY};
use crate::reconcile::handlers::{
    derive_default, derive_example, reconcile, reconcile_nested, Walk,
};
use crate::schema::{IncludeFilter, TrackerSchema};

/// 默认实例（记录形式）；生成相关遍历，EPHEMERAL 字段计入 DYNAMIC
pub fn default_record(schema: &TrackerSchema, include: IncludeFilter) -> Record {
    let walk = Walk::new(include, true);
    schema
        .fields()
        .filter(|field| walk.includes(field))
        .map(|field| (field.name.clone(), derive_default(field, walk)))
        .collect()
}

pub fn get_default_tracker(
    schema: &TrackerSchema,
    include: IncludeFilter,
    format: OutputFormat,
) -> TrackerOutput {
    TrackerOutput::new(default_record(schema, include), format)
}

/// 每个示例槽位一个实例，数量等于整棵 Schema 上最长的示例数组
pub fn get_example_trackers(
    schema: &TrackerSchema,
    include: IncludeFilter,
    format: OutputFormat,
) -> Vec<TrackerOutput> {
    let walk = Walk::new(include, true);
    (0..schema.max_example_count())
        .map(|index| {
            let record: Record = schema
                .fields()
                .filter(|field| walk.includes(field))
                .map(|field| (field.name.clone(), derive_example(field, walk, index)))
                .collect();
            TrackerOutput::new(record, format)
        })
        .collect()
}

/// 规范化输入：逐字段调和，未匹配的顶层键与输入自带的 `_extraFields` 合并进侧通道；
/// `include_unmatched` 为 false 时不输出 `_extraFields`
pub fn get_tracker(
    input: impl Into<TrackerInput>,
    schema: &TrackerSchema,
    include: IncludeFilter,
    include_unmatched: bool,
    format: OutputFormat,
) -> TrackerOutput {
    let input = input.into().into_record();
    let walk = Walk::new(include, false);

    let mut extras = Record::new();
    let mut record = reconcile_nested(schema, walk, &input, &mut extras);
    collect_leftovers(&input, &record, &mut extras);

    let extras = merge_extra_fields(Value::Object(extras), input.get(EXTRA_FIELDS_KEY));
    if include_unmatched {
        attach_extra_fields(&mut record, extras);
    }

    TrackerOutput::new(record, format)
}

/// 把新生成的实例合并进已有实例。
///
/// 每个字段优先取 `new` 中的值，其次 `existing`，两者都经过同一处理器调和。
/// 未匹配的顶层键先取自 `new`，`prefer_new_extra_fields` 为 false 时再取自 `existing`（不覆盖已有键）。
/// `prefer_new_extra_fields` 为 true 时 `new._extraFields` 存在则原样采用（本次调和产生的
/// 未匹配值被丢弃），不存在时只保留本次调和产生的未匹配值；否则依次合并
/// 已有侧通道、`existing._extraFields` 与 `new._extraFields`，冲突时 `new` 胜出。
pub fn update_tracker(
    existing: impl Into<TrackerInput>,
    new: impl Into<TrackerInput>,
    schema: &TrackerSchema,
    include_unmatched: bool,
    format: OutputFormat,
    prefer_new_extra_fields: bool,
) -> TrackerOutput {
    let existing = existing.into().into_record();
    let new = new.into().into_record();
    let walk = Walk::new(IncludeFilter::All, false);

    let mut extras = Record::new();
    let mut record = Record::new();
    for field in schema.fields() {
        let value = new
            .get(&field.name)
            .filter(|value| !value.is_null())
            .or_else(|| existing.get(&field.name));
        record.insert(field.name.clone(), reconcile(field, walk, value, &mut extras));
    }

    if include_unmatched {
        collect_leftovers(&new, &record, &mut extras);
        if !prefer_new_extra_fields {
            collect_leftovers(&existing, &record, &mut extras);
        }
    }

    let new_extras = new
        .get(EXTRA_FIELDS_KEY)
        .filter(|value| !value.is_null() && value.as_str() != Some(""));
    let extras = if prefer_new_extra_fields {
        match new_extras {
            Some(verbatim) => verbatim.clone(),
            None => Value::Object(extras),
        }
    } else {
        let merged = merge_extra_fields(Value::Object(extras), existing.get(EXTRA_FIELDS_KEY));
        merge_extra_fields(merged, new.get(EXTRA_FIELDS_KEY))
    };

    if include_unmatched {
        attach_extra_fields(&mut record, extras);
    }

    TrackerOutput::new(record, format)
}

/// 顶层未匹配键（保留键除外），已被占用的键不覆盖
fn collect_leftovers(input: &Record, record: &Record, extras: &mut Record) {
    for (key, value) in input {
        if key == EXTRA_FIELDS_KEY || record.contains_key(key) || extras.contains_key(key) {
            continue;
        }
        extras.insert(key.clone(), value.clone());
    }
}

/// 字段说明列表：每个带提示的字段一条 Markdown 项，嵌套字段逐级缩进；
/// 没有提示的叶子字段不出现，容器字段即使没有提示也保留以承载子项
pub fn get_tracker_prompt(schema: &TrackerSchema, include: IncludeFilter) -> String {
    let mut lines = Vec::new();
    build_prompt_lines(schema, Walk::new(include, true), 0, &mut lines);
    lines.join("\n").trim().to_string()
}

fn build_prompt_lines(schema: &TrackerSchema, walk: Walk, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    for field in schema.fields().filter(|field| walk.includes(field)) {
        let container = !field.nested_fields.is_empty();
        if field.prompt.is_empty() && !container {
            continue;
        }

        if field.prompt.is_empty() {
            lines.push(format!("{indent}- **{}:**", field.name));
        } else {
            lines.push(format!("{indent}- **{}:** {}", field.name, field.prompt));
        }
        if container {
            build_prompt_lines(&field.nested_fields, walk, depth + 1, lines);
        }
    }
}
