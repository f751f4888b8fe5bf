//! 分词模块
//!
//! 中英文混合分词，供本地哈希嵌入使用。
//! 含 CJK 字符时用 jieba-rs 分词，其余按非字母数字字符切分。

use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 英文片段：按非字母数字切分，小写，去掉单字符词
fn split_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() > 1)
        .map(|s| s.to_lowercase())
}

/// 智能分词：含 CJK 时走 jieba 搜索模式，否则按词切分
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .flat_map(|piece| {
                if piece.chars().any(is_cjk) {
                    vec![piece.to_string()]
                } else {
                    split_words(piece).collect()
                }
            })
            .collect()
    } else {
        split_words(text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("Question: which team scored the most goals?");
        assert!(tokens.contains(&"question".to_string()));
        assert!(tokens.contains(&"goals".to_string()));
        assert!(!tokens.iter().any(|t| t.ends_with('?')));
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("哪个国家获得的金牌最多");
        assert!(tokens.iter().any(|t| t.contains("金牌") || t.contains("国家")));
    }

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("表格 table"));
        assert!(!contains_cjk("plain table"));
    }
}
