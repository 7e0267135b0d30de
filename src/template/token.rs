//! 模板分词：一次正则扫描产出文本、变量、块开始、块结束四种记号

use regex::Regex;
use std::sync::OnceLock;

static TAG_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 两个占位符之间的原文
    Text(String),
    /// `{{path | op() ...}}`，标签与其后参数合在一起，便于管道操作
    Variable(String),
    /// `{{#tag params}}`
    Start { tag: String, params: String },
    /// `{{/tag}}`
    End { tag: String },
}

pub fn tokenize(template: &str) -> Vec<Token> {
    let re = TAG_RE.get_or_init(|| {
        Regex::new(r"\{\{\s*(/?)\s*(#?)\s*([\w.]+|\^)\s*(.*?)\s*\}\}").expect("tag pattern is valid")
    });

    let mut tokens = Vec::new();
    let mut cursor = 0;

    for caps in re.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > cursor {
            tokens.push(Token::Text(template[cursor..whole.start()].to_string()));
        }

        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let opening = caps.get(2).is_some_and(|m| !m.as_str().is_empty());
        let tag = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();
        let params = caps.get(4).map_or("", |m| m.as_str()).trim().to_string();

        let token = if closing {
            Token::End { tag }
        } else if opening {
            Token::Start { tag, params }
        } else if params.is_empty() {
            Token::Variable(tag)
        } else {
            Token::Variable(format!("{tag} {params}"))
        };
        tokens.push(token);

        cursor = whole.end();
    }

    if cursor < template.len() {
        tokens.push(Token::Text(template[cursor..].to_string()));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenize_shapes() {
        let tokens = tokenize("Hi {{ name }}!{{#if a > 1}}x{{/if}}");
        assert_eq!(
            tokens,
            vec![
                Token::Text("Hi ".into()),
                Token::Variable("name".into()),
                Token::Text("!".into()),
                Token::Start {
                    tag: "if".into(),
                    params: "a > 1".into()
                },
                Token::Text("x".into()),
                Token::End { tag: "if".into() },
            ]
        );
    }

    #[test]
    fn test_variable_keeps_pipes() {
        assert_eq!(
            tokenize("{{Location | toUpperCase()}}"),
            vec![Token::Variable("Location | toUpperCase()".into())]
        );
    }

    #[test]
    fn test_plain_text_and_braces() {
        assert_eq!(tokenize("no tags"), vec![Token::Text("no tags".into())]);
        assert_eq!(tokenize("{{ }}"), vec![Token::Text("{{ }}".into())]);
        assert!(tokenize("").is_empty());
    }
}
