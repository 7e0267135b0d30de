//! 模板求值：递归处理记号序列，`if` / `foreach` 按深度配对结束标签，`join` 无结束标签

use regex::Regex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::OnceLock;

use crate::core::TemplateError;
use crate::format::Record;
use crate::template::token::Token;

static JOIN_RE: OnceLock<Regex> = OnceLock::new();
static SUBSTRING_RE: OnceLock<Regex> = OnceLock::new();

/// 比较运算符，两字符的先匹配
const OPERATORS: [&str; 6] = [">=", "<=", "==", "!=", ">", "<"];

/// 渲染模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// 展示模板：字符串值中的 `<`、`>` 被转义，缺失变量输出空串
    Display,
    /// 提示模板：原样插入；缺失变量保留 `{{...}}` 原文，留给宿主展开自己的宏
    Prompt,
}

/// 一次渲染的求值器
pub struct Evaluator<'a> {
    data: &'a Value,
    mode: RenderMode,
}

impl<'a> Evaluator<'a> {
    pub fn new(data: &'a Value, mode: RenderMode) -> Self {
        Self { data, mode }
    }

    pub fn process(&self, tokens: Vec<Token>, context: &Record) -> Result<String, TemplateError> {
        let mut queue: VecDeque<Token> = tokens.into();
        let mut out = String::new();

        while let Some(token) = queue.pop_front() {
            match token {
                Token::Text(text) => out.push_str(&text),
                Token::Variable(path) => match self.get_value(&path, context) {
                    None if self.mode == RenderMode::Prompt => {
                        out.push_str(&format!("{{{{{path}}}}}"));
                    }
                    value => out.push_str(&display_value(value.as_ref(), context)),
                },
                Token::Start { tag, params } => match tag.as_str() {
                    "if" => {
                        let inner = extract_inner(&mut queue, "if")?;
                        if self.evaluate_condition(&params, context) {
                            out.push_str(&self.process(inner, context)?);
                        }
                    }
                    "foreach" => {
                        let inner = extract_inner(&mut queue, "foreach")?;
                        out.push_str(&self.process_foreach(&params, inner, context)?);
                    }
                    "join" => out.push_str(&self.process_join(&params, context)),
                    other => tracing::debug!(tag = other, "Ignoring unknown template block"),
                },
                // 结束标签在提取内部记号时消费，游离的直接忽略
                Token::End { .. } => {}
            }
        }

        Ok(out)
    }

    fn process_foreach(
        &self,
        params: &str,
        inner: Vec<Token>,
        context: &Record,
    ) -> Result<String, TemplateError> {
        let mut parts = params.split_whitespace();
        let Some(collection_name) = parts.next() else {
            return Ok(String::new());
        };
        let item_name = parts.next();

        let entries: Vec<(Value, Value)> = match self.get_value(collection_name, context) {
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (Value::from(index), item))
                .collect(),
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect(),
            _ => return Ok(String::new()),
        };

        let mut out = String::new();
        for (index, (key, item)) in entries.into_iter().enumerate() {
            let mut child = context.clone();
            if let Some(name) = item_name {
                child.insert(name.to_string(), item);
            }
            child.insert("index".to_string(), Value::from(index));
            child.insert("_key".to_string(), key);
            out.push_str(&self.process(inner.clone(), &child)?);
        }
        Ok(out)
    }

    fn process_join(&self, params: &str, context: &Record) -> String {
        let re = JOIN_RE.get_or_init(|| {
            Regex::new(r#"^(?:'([^']*)'|"([^"]*)")\s+(.+)$"#).expect("join pattern is valid")
        });
        let Some(caps) = re.captures(params) else {
            return String::new();
        };
        let separator = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        let name = caps.get(3).map_or("", |m| m.as_str()).trim();

        let values: Vec<Value> = match self.get_value(name, context) {
            Some(Value::Array(items)) => items,
            Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
            _ => return String::new(),
        };

        values
            .iter()
            .map(|value| match value {
                Value::String(s) => self.escape(s),
                Value::Null => String::new(),
                Value::Object(_) | Value::Array(_) => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// 点号路径取值：首段先查上下文再查根数据，后续逐段下钻；管道后缀对字符串执行变换
    fn get_value(&self, variable: &str, context: &Record) -> Option<Value> {
        let mut segments = variable.split('|').map(str::trim);
        let path = segments.next().unwrap_or_default();
        let operations: Vec<&str> = segments.collect();

        let mut parts = path.split('.');
        let head = parts.next().unwrap_or_default();
        let mut value = context
            .get(head)
            .or_else(|| self.data.get(head))
            .cloned()?;

        for part in parts {
            value = match &value {
                Value::Object(map) => map.get(part).cloned()?,
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i).cloned())?,
                _ => return None,
            };
        }

        if let Value::String(text) = value {
            let text = apply_string_operations(text, &operations);
            return Some(Value::String(self.escape(&text)));
        }
        Some(value)
    }

    fn escape(&self, text: &str) -> String {
        if self.mode == RenderMode::Display {
            text.replace('<', "&lt;").replace('>', "&gt;")
        } else {
            text.to_string()
        }
    }

    fn evaluate_condition(&self, condition: &str, context: &Record) -> bool {
        let Some(op) = OPERATORS.iter().copied().find(|op| condition.contains(op)) else {
            return is_truthy(self.get_value(condition.trim(), context).as_ref());
        };

        let (left, right) = condition.split_once(op).unwrap_or((condition, ""));
        let left = self.get_value(left.trim(), context);
        let right = strip_quotes(right.trim());

        let Some(left) = left.filter(|v| !v.is_null()) else {
            return op == "!=";
        };

        let left_text = match &left {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let ordering = match (left_text.trim().parse::<f64>(), right.trim().parse::<f64>()) {
            (Ok(l), Ok(r)) => l.partial_cmp(&r),
            _ => Some(left_text.as_str().cmp(right)),
        };
        let Some(ordering) = ordering else {
            return op == "!=";
        };

        match op {
            "==" => ordering.is_eq(),
            "!=" => ordering.is_ne(),
            ">" => ordering.is_gt(),
            "<" => ordering.is_lt(),
            ">=" => ordering.is_ge(),
            "<=" => ordering.is_le(),
            _ => false,
        }
    }
}

/// 取出到匹配结束标签为止的内部记号，同名块按深度配对
pub fn extract_inner(queue: &mut VecDeque<Token>, tag: &str) -> Result<Vec<Token>, TemplateError> {
    let mut depth = 1;
    let mut inner = Vec::new();

    while let Some(token) = queue.pop_front() {
        match &token {
            Token::Start { tag: t, .. } if t == tag => depth += 1,
            Token::End { tag: t } if t == tag => {
                depth -= 1;
                if depth == 0 {
                    return Ok(inner);
                }
            }
            _ => {}
        }
        inner.push(token);
    }

    Err(TemplateError::Unmatched {
        tag: tag.to_string(),
    })
}

/// 变量的输出文本：对象优先取 `name`，其次 `id`，否则退回所在循环的 `_key`
fn display_value(value: Option<&Value>, context: &Record) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) => {
            let picked = map
                .get("name")
                .or_else(|| map.get("id"))
                .or_else(|| context.get("_key"));
            scalar_text(picked)
        }
        Some(Value::Array(_)) => scalar_text(context.get("_key")),
        Some(other) => other.to_string(),
    }
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn strip_quotes(text: &str) -> &str {
    let text = text.strip_prefix(['"', '\'']).unwrap_or(text);
    text.strip_suffix(['"', '\'']).unwrap_or(text)
}

fn apply_string_operations(mut value: String, operations: &[&str]) -> String {
    let substring = SUBSTRING_RE.get_or_init(|| {
        Regex::new(r"substring\((\d+),\s*(\d+)\)").expect("substring pattern is valid")
    });

    for operation in operations {
        value = match *operation {
            "toUpperCase()" => value.to_uppercase(),
            "toLowerCase()" => value.to_lowercase(),
            "trim()" => value.trim().to_string(),
            op if op.starts_with("substring(") => match substring.captures(op) {
                Some(caps) => {
                    let start = caps[1].parse::<usize>().unwrap_or(0);
                    let end = caps[2].parse::<usize>().unwrap_or(0);
                    char_substring(&value, start, end)
                }
                None => value,
            },
            _ => value,
        };
    }
    value
}

/// 与常见 substring 语义一致：越界截断，起止颠倒时交换
fn char_substring(value: &str, start: usize, end: usize) -> String {
    let len = value.chars().count();
    let (start, end) = (start.min(len), end.min(len));
    let (start, end) = if start > end { (end, start) } else { (start, end) };
    value.chars().skip(start).take(end - start).collect()
}
