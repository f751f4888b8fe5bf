//! 回复解析：从模型自由文本中提取 JSON 对象
//!
//! 流程：去掉聊天模板标记 → 提取候选片段（```json 围栏 > 任意围栏 > 第一个配平的 {…}）
//! → 依次尝试若干修正后 `serde_json::from_str`。非对象结果包装为 `{"answer": v}`。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty response")]
    Empty,
    #[error("no JSON object found")]
    NoJson,
}

const SPECIAL_TOKENS: [&str; 8] = [
    "<|start_header_id|>assistent<|end_header_id|>",
    "<|start_header_id|>assistant<|end_header_id|>",
    "<|im_start|>system",
    "<|im_start|>user",
    "<|im_start|>",
    "<|im_end|>",
    "<think>",
    "</think>",
];

/// 去掉聊天模板残留标记
pub fn strip_special_tokens(text: &str) -> String {
    SPECIAL_TOKENS
        .iter()
        .fold(text.to_string(), |acc, tok| acc.replace(tok, "").trim().to_string())
}

/// 提取候选 JSON 片段
pub fn extract_json_block(text: &str) -> String {
    if let Some(last) = text.split("```json").skip(1).last() {
        return last.split("```").next().unwrap_or("").trim().to_string();
    }
    let parts: Vec<&str> = text.split("```").collect();
    if parts.len() >= 3 {
        return parts[1].trim().to_string();
    }

    let text = text.trim();
    if let Some(start) = text.find('{') {
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, ch) in text[start..].char_indices() {
            if ch == '\\' && !escaped {
                escaped = true;
                continue;
            }
            if ch == '"' && !escaped {
                in_string = !in_string;
            }
            if !in_string {
                if ch == '{' {
                    depth += 1;
                } else if ch == '}' {
                    depth -= 1;
                    if depth == 0 {
                        return text[start..start + offset + ch.len_utf8()].to_string();
                    }
                }
            }
            escaped = false;
        }
    }
    text.to_string()
}

/// 解析模型回复为 JSON 对象
pub fn parse_json(response: &str) -> Result<Map<String, Value>, ParseError> {
    if response.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let cleaned = strip_special_tokens(response);
    let block = extract_json_block(&cleaned);

    let fixes: [fn(&str) -> String; 5] = [
        |s| s.to_string(),
        |s| s.replace("\\\"", "\""),
        |s| s.replace('\'', "\""),
        |s| s.replace(['\n', '\r'], ""),
        |s| s.trim_matches(|c| c == '"' || c == '`').to_string(),
    ];
    for fix in fixes {
        if let Ok(value) = serde_json::from_str::<Value>(&fix(&block)) {
            return Ok(match value {
                Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    map.insert("answer".to_string(), other);
                    map
                }
            });
        }
    }
    Err(ParseError::NoJson)
}

fn baseline_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)the answer is\s*[:：]?\s*(.*?)(?:[\n\.!\r]|$)").ok())
        .as_ref()
}

/// Baseline 回复：取最后一个 "the answer is: X" 中的 X，否则取整段文本
pub fn parse_baseline_answer(response: &str) -> String {
    baseline_regex()
        .and_then(|re| re.captures_iter(response).last())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| response.trim().to_string())
}

/// 类布尔值的归一化（全函数）：yes/true/correct → true，其余一律 false
pub fn normalize_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(clean_token(s).as_str(), "yes" | "true" | "correct"),
        _ => false,
    }
}

/// 小写、去掉换行与制表符、去掉首尾 ASCII 标点
pub fn clean_token(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['\n', '\t'], "")
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}
