//! 从模型原始输出中取出 `<tracker>` 载荷并解析为记录

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::core::GenerationError;
use crate::format::{yml, OutputFormat, Record};

static PAYLOAD_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();

/// 反斜杠后可直接丢弃、只保留字符本身的标点
const SPECIAL_CHARS: &str = "~!@#$%^&*()_+{}|:<>?-=[];',.";

/// 修复模型常见的 JSON 转义错误：字符串外的反斜杠全部删除，字符串内的非法转义改写为合法形式
pub fn unescape_json_string(input: &str) -> String {
    let re = QUOTED_RE.get_or_init(|| {
        Regex::new(r#"(?s)("(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*')|\\"#).expect("quoted string pattern is valid")
    });

    re.replace_all(input, |caps: &regex::Captures| match caps.get(1) {
        Some(quoted) => repair_escapes(quoted.as_str()),
        None => String::new(),
    })
    .into_owned()
}

fn repair_escapes(quoted: &str) -> String {
    let chars: Vec<char> = quoted.chars().collect();
    let mut out = String::with_capacity(quoted.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }

        // 收尾引号前的反斜杠也算结尾
        let Some(&next) = chars.get(i + 1).filter(|_| i + 2 < chars.len()) else {
            out.push_str("\\\\");
            i += 1;
            continue;
        };

        match next {
            '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => {
                out.push('\\');
                out.push(next);
            }
            'u' if chars.len() > i + 5 && chars[i + 2..i + 6].iter().all(char::is_ascii_hexdigit) => {
                out.push_str("\\u");
            }
            'u' => out.push_str("\\\\u"),
            special if SPECIAL_CHARS.contains(special) => out.push(special),
            other => {
                out.push_str("\\\\");
                out.push(other);
            }
        }
        i += 2;
    }
    out
}

/// 第一个 `<tracker>…</tracker>`（标签名大小写两种写法均可）的内容，去掉首尾空白
pub fn extract_payload(text: &str) -> Result<String, GenerationError> {
    let re = PAYLOAD_RE.get_or_init(|| {
        Regex::new(r"<(?:tracker|Tracker)>([\s\S]*?)</(?:tracker|Tracker)>")
            .expect("tracker payload pattern is valid")
    });
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or(GenerationError::MissingPayload)
}

/// 解析生成结果：JSON 模式先修复转义；载荷必须是非空对象
pub fn parse_generated(text: &str, format: OutputFormat) -> Result<Record, GenerationError> {
    let record = match format {
        OutputFormat::Json => {
            let payload = extract_payload(&unescape_json_string(text))?;
            match serde_json::from_str::<Value>(&payload) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(GenerationError::Parse(format!(
                        "expected an object, got {other}"
                    )))
                }
                Err(e) => return Err(GenerationError::Parse(e.to_string())),
            }
        }
        OutputFormat::Yaml => {
            let payload = extract_payload(text)?;
            match yml::parse(&payload) {
                Value::Object(map) => map,
                _ => Record::new(),
            }
        }
    };

    if record.is_empty() {
        return Err(GenerationError::Parse("payload contains no fields".to_string()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_extract_payload_variants() {
        assert_eq!(
            extract_payload("noise <Tracker>\n  a: 1 \n</Tracker> tail").unwrap(),
            "a: 1"
        );
        assert!(matches!(
            extract_payload("no block here"),
            Err(GenerationError::MissingPayload)
        ));
    }

    #[test]
    fn test_unescape_outside_and_inside_strings() {
        assert_eq!(unescape_json_string(r#"{\"a\": 1}"#), r#"{"a": 1}"#);
        assert_eq!(unescape_json_string(r#"{"a": "x\n\"y\""}"#), r#"{"a": "x\n\"y\""}"#);
        assert_eq!(unescape_json_string(r#"{"a": "50\% off"}"#), r#"{"a": "50% off"}"#);
        assert_eq!(unescape_json_string(r#"{"a": "C:\dir"}"#), r#"{"a": "C:\\dir"}"#);
        assert_eq!(unescape_json_string(r#"{"a": "\u00e9 \uzz"}"#), r#"{"a": "\u00e9 \\uzz"}"#);
    }

    #[test]
    fn test_parse_generated_json() {
        let text = "Sure!\n<tracker>\n{\"Location\": \"Kitchen\", \"Mood\": \"50\\% calm\"}\n</tracker>";
        let record = parse_generated(text, OutputFormat::Json).unwrap();
        assert_eq!(
            Value::Object(record),
            json!({"Location": "Kitchen", "Mood": "50% calm"})
        );

        assert!(parse_generated("<tracker>[1, 2]</tracker>", OutputFormat::Json)
            .unwrap_err()
            .is_parse_failure());
        assert!(parse_generated("<tracker>{oops</tracker>", OutputFormat::Json)
            .unwrap_err()
            .is_parse_failure());
    }

    #[test]
    fn test_parse_generated_yaml() {
        let text = "<tracker>\nLocation: \"Garden\"\nCharactersPresent: [\"Emma\"]\n</tracker>";
        let record = parse_generated(text, OutputFormat::Yaml).unwrap();
        assert_eq!(
            Value::Object(record),
            json!({"Location": "Garden", "CharactersPresent": ["Emma"]})
        );
        assert!(parse_generated("<tracker>\n</tracker>", OutputFormat::Yaml)
            .unwrap_err()
            .is_parse_failure());
    }
}
