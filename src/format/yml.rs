//! 轻量结构化文本（YAML 子集）转换器
//!
//! 按行解析，不是完整的 YAML 实现：
//! - 两个空格为一级缩进；回退缩进时活动路径被截断为 `indent / 2 + 1` 段，缩进不规则时会被重新挂接
//! - `key: value` 设置标量或行内列表，`key:` 打开嵌套对象，`- item` 追加到当前路径下的数组
//! - 以 `"` 开头但未在同一行闭合的值开启多行字符串，直到某行以 `"` 结尾
//!
//! 往返只保证字段值不丢，不保证格式逐字节一致。

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

static NUMERIC_RE: OnceLock<Regex> = OnceLock::new();

/// 将结构化文本解析为嵌套记录；从不失败，无法识别的行尽力而为
pub fn parse(text: &str) -> Value {
    let mut root = Value::Object(Map::new());
    let mut path: Vec<String> = Vec::new();
    let mut current_indent: Option<usize> = None;
    let mut multiline: Option<String> = None;

    for raw in text.split('\n') {
        let line = raw.trim_end();

        if let Some(buffer) = multiline.as_mut() {
            buffer.push('\n');
            buffer.push_str(line);
            if line.ends_with('"') {
                let value = strip_outer(buffer).to_string();
                set_at_path(&mut root, &path, Value::String(value));
                multiline = None;
            }
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let indent = line.len() - trimmed.len();
        match current_indent {
            Some(current) if indent < current => path.truncate(indent / 2 + 1),
            Some(current) if indent == current => {}
            _ => path.push(String::new()),
        }
        current_indent = Some(indent);

        if let Some(item) = trimmed.strip_prefix("- ") {
            let item = item.trim();
            let value = if is_double_quoted(item) {
                Value::String(strip_outer(item).to_string())
            } else {
                parse_scalar(item)
            };
            push_list_item(&mut root, list_path(&path), value);
        } else if let Some(separator) = line.find(": ") {
            let key = line[..separator].trim().to_string();
            let mut value = strip_comment(line[separator + 1..].trim()).to_string();
            if value.starts_with('#') {
                value.clear();
            }
            set_last_segment(&mut path, key);

            if value.starts_with('"') && !value.ends_with('"') {
                multiline = Some(value);
            } else if value.starts_with('[') && value.ends_with(']') {
                set_at_path(&mut root, &path, parse_inline_list(&value));
            } else if is_double_quoted(&value) {
                set_at_path(&mut root, &path, Value::String(strip_outer(&value).to_string()));
            } else {
                set_at_path(&mut root, &path, parse_scalar(&value));
            }
        } else {
            let key = trimmed.strip_suffix(':').unwrap_or(trimmed).trim_end().to_string();
            set_last_segment(&mut path, key);
            set_at_path(&mut root, &path, Value::Object(Map::new()));
        }
    }

    if multiline.is_some() {
        tracing::debug!("Structural text ended inside an unterminated multi-line string");
    }

    root
}

/// 将嵌套记录序列化为结构化文本；对象逐级缩进两个空格，数组写成行内列表（记录数组写成 JSON），字符串总是加引号
pub fn serialize(value: &Value) -> String {
    match value {
        Value::Object(map) => serialize_map(map, 0),
        other => scalar_text(other),
    }
}

fn serialize_map(map: &Map<String, Value>, level: usize) -> String {
    let indentation = "  ".repeat(level);
    let mut out = String::new();

    for (key, value) in map {
        match value {
            Value::Object(nested) => {
                out.push_str(&format!("{indentation}{key}:\n"));
                out.push_str(&serialize_map(nested, level + 1));
            }
            Value::Array(items) if items.iter().any(|item| item.is_object() || item.is_array()) => {
                // 记录数组整体写成 JSON，解析时原样读回
                out.push_str(&format!("{indentation}{key}: {value}\n"));
            }
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => format!("\"{s}\""),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!("{indentation}{key}: [{joined}]\n"));
            }
            scalar => {
                out.push_str(&format!("{indentation}{key}: {}\n", scalar_text(scalar)));
            }
        }
    }

    out
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// 标量强制转换：true/false → 布尔，形如数字 → 数字，其余原样
fn parse_scalar(value: &str) -> Value {
    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    let numeric = NUMERIC_RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("numeric pattern is valid")
    });
    if numeric.is_match(value) {
        if let Ok(int) = value.parse::<i64>() {
            return Value::Number(int.into());
        }
        if let Some(number) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }

    Value::String(value.to_string())
}

/// `[a, "b, c"]` → 去引号、去空白的字符串数组；引号内的逗号不拆分。
/// 含对象或数组的 JSON 数组按 JSON 读回
fn parse_inline_list(value: &str) -> Value {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(value) {
        if items.iter().any(|item| item.is_object() || item.is_array()) {
            return Value::Array(items);
        }
    }

    let inner = &value[1..value.len() - 1];
    if inner.trim().is_empty() {
        return Value::Array(Vec::new());
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in inner.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => items.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    items.push(current);

    Value::Array(
        items
            .into_iter()
            .map(|item| {
                let item = item.trim();
                let item = item.strip_prefix('"').unwrap_or(item);
                let item = item.strip_suffix('"').unwrap_or(item);
                Value::String(item.to_string())
            })
            .collect(),
    )
}

/// 去掉行尾注释：第一个其后不再出现引号的 `#` 起算
fn strip_comment(value: &str) -> &str {
    for (idx, ch) in value.char_indices() {
        if ch == '#' && !value[idx..].contains(['"', '\'']) {
            return value[..idx].trim();
        }
    }
    value
}

fn is_double_quoted(value: &str) -> bool {
    value.starts_with('"') && value.ends_with('"')
}

fn strip_outer(value: &str) -> &str {
    if value.len() >= 2 {
        &value[1..value.len() - 1]
    } else {
        ""
    }
}

fn set_last_segment(path: &mut Vec<String>, key: String) {
    match path.last_mut() {
        Some(last) => *last = key,
        None => path.push(key),
    }
}

/// 列表项挂在最近一个具名键上（去掉缩进加深时压入的占位段）
fn list_path(path: &[String]) -> &[String] {
    let end = path
        .iter()
        .rposition(|segment| !segment.is_empty())
        .map_or(0, |idx| idx + 1);
    &path[..end]
}

fn push_list_item(root: &mut Value, path: &[String], value: Value) {
    if !matches!(get_at_path(root, path), Some(Value::Array(_))) {
        set_at_path(root, path, Value::Array(Vec::new()));
    }
    if let Some(Value::Array(items)) = get_at_path_mut(root, path) {
        items.push(value);
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn get_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| {
        current.get(segment.as_str()).filter(|value| !is_falsy(value))
    })
}

fn get_at_path_mut<'a>(root: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(root, |current, segment| current.get_mut(segment.as_str()))
}

fn set_at_path(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        let slot = ensure_object(current)
            .entry(segment.clone())
            .or_insert(Value::Null);
        if is_falsy(slot) {
            *slot = Value::Object(Map::new());
        }
        current = slot;
    }
    ensure_object(current).insert(last.clone(), value);
}

/// 非对象节点被替换为空对象（不规则缩进下的重新挂接）
fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_scalars_and_block_list() {
        let text = "Time: \"09:00:00\"\nCharacters:\n  - Alice\n  - Bob\n";
        assert_eq!(
            parse(text),
            json!({"Time": "09:00:00", "Characters": ["Alice", "Bob"]})
        );
    }

    #[test]
    fn test_parse_nested_objects_and_dedent() {
        let text = "Characters:\n  Alice:\n    Hair: \"red\"\n  Bob:\n    Hair: \"black\"\nWeather: \"rain\"";
        assert_eq!(
            parse(text),
            json!({
                "Characters": {"Alice": {"Hair": "red"}, "Bob": {"Hair": "black"}},
                "Weather": "rain"
            })
        );
    }

    #[test]
    fn test_parse_coercion() {
        let parsed = parse("a: true\nb: false\nc: 42\nd: 1.5\ne: \"42\"\nf: hello world\ng: -3");
        assert_eq!(
            parsed,
            json!({"a": true, "b": false, "c": 42, "d": 1.5, "e": "42", "f": "hello world", "g": -3})
        );
    }

    #[test]
    fn test_parse_comments_and_blank_lines() {
        let text = "# header\n\nLocation: \"Kitchen\" # trailing\nNote: \"a # b\"\n";
        assert_eq!(parse(text), json!({"Location": "Kitchen", "Note": "a # b"}));
    }

    #[test]
    fn test_parse_multiline_string() {
        let text = "Outfit: \"red dress,\n  black heels\"\nTime: \"noon\"";
        assert_eq!(
            parse(text),
            json!({"Outfit": "red dress,\n  black heels", "Time": "noon"})
        );
    }

    #[test]
    fn test_parse_inline_lists() {
        let parsed = parse("Tags: [\"a, b\", c ,  \"d\"]\nEmpty: []");
        assert_eq!(parsed, json!({"Tags": ["a, b", "c", "d"], "Empty": []}));
    }

    #[test]
    fn test_parse_bare_key_opens_object() {
        assert_eq!(parse("Topics:\nOther"), json!({"Topics": {}, "Other": {}}));
    }

    #[test]
    fn test_irregular_indent_reparents() {
        // 三个空格的缩进回退到 3/2+1 = 2 段路径，Second 被挂到 Outer 之下
        let text = "Outer:\n  Inner:\n      Deep: \"x\"\n   Second: \"y\"";
        let parsed = parse(text);
        assert_eq!(parsed["Outer"]["Second"], json!("y"));
        assert_eq!(parsed["Outer"]["Inner"]["Deep"], json!("x"));
    }

    #[test]
    fn test_serialize_shapes() {
        let value = json!({
            "Time": "09:00",
            "Count": 3,
            "Flag": false,
            "Tags": ["a", 1, true],
            "Characters": {"Alice": {"Hair": "red"}}
        });
        assert_eq!(
            serialize(&value),
            "Time: \"09:00\"\nCount: 3\nFlag: false\nTags: [\"a\", 1, true]\nCharacters:\n  Alice:\n    Hair: \"red\"\n"
        );
    }

    #[test]
    fn test_round_trip_values_survive() {
        let value = json!({
            "Time": "09:15:30; 10/16/2024 (Wednesday)",
            "Present": ["Alice", "Bob, the builder"],
            "Score": 7,
            "Ratio": 0.25,
            "Active": true,
            "Characters": {"Alice": {"Outfit": "coat\nboots", "Hair": "true"}}
        });
        assert_eq!(parse(&serialize(&value)), value);
    }

    #[test]
    fn test_record_array_round_trip() {
        let value = json!({
            "Items": [{"Name": "?", "Kind": "k"}, {"Name": "Lamp, brass", "Kind": "light #2"}],
            "Scene": {"Groups": [["a", "b"], []]}
        });
        let text = serialize(&value);
        assert!(text.starts_with("Items: [{\"Name\":\"?\",\"Kind\":\"k\"}"));
        assert_eq!(parse(&text), value);
    }
}
