//! 提示词本：按 (数据集, 键) 查找 system / user 模板
//!
//! TOML 结构为 `[数据集.键]`，每项含 `system` 与 `user`；数据集缺失的键回退到 `[common.键]`。
//! 模板中的 `{name}` 由 `render` 一次性替换（替换进去的值不会再被展开），
//! 未提供的名字与其余花括号（如 JSON 示例）原样保留。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::core::HiveError;
use crate::llm::PromptPair;

/// 内置提示词本（config/prompts.toml）
const BUILTIN_PROMPTS: &str = include_str!("../../config/prompts.toml");

pub const COMMON_SECTION: &str = "common";
pub const EVOLVE_OPTIONAL_KEY: &str = "evolve_optional";
pub const EVOLVE_ALWAYS_KEY: &str = "evolve_always";

#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").ok()).as_ref()
}

impl PromptTemplate {
    pub fn render(&self, vars: &[(&str, String)]) -> PromptPair {
        let user = match placeholder_regex() {
            Some(re) => re
                .replace_all(&self.user, |caps: &Captures| {
                    vars.iter()
                        .find(|(name, _)| *name == &caps[1])
                        .map(|(_, value)| value.clone())
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned(),
            None => self.user.clone(),
        };
        PromptPair::new(self.system.trim(), user.trim())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBook {
    sections: BTreeMap<String, BTreeMap<String, PromptTemplate>>,
}

impl PromptBook {
    pub fn from_toml_str(text: &str) -> Result<Self, HiveError> {
        let sections = toml::from_str(text)
            .map_err(|e| HiveError::Config(format!("invalid prompt book: {e}")))?;
        Ok(Self { sections })
    }

    pub fn builtin() -> Result<Self, HiveError> {
        Self::from_toml_str(BUILTIN_PROMPTS)
    }

    /// 指定文件则读文件，否则用内置提示词本
    pub fn load(path: Option<&Path>) -> Result<Self, HiveError> {
        match path {
            Some(p) => Self::from_toml_str(&std::fs::read_to_string(p)?),
            None => Self::builtin(),
        }
    }

    pub fn get(&self, dataset: &str, key: &str) -> Result<&PromptTemplate, HiveError> {
        self.sections
            .get(dataset)
            .and_then(|s| s.get(key))
            .or_else(|| self.sections.get(COMMON_SECTION).and_then(|s| s.get(key)))
            .ok_or_else(|| HiveError::MissingPrompt {
                dataset: dataset.to_string(),
                role: key.to_string(),
            })
    }

    pub fn has(&self, dataset: &str, key: &str) -> bool {
        self.get(dataset, key).is_ok()
    }
}

pub fn baseline_key(variant: &str) -> String {
    format!("Baseline_{variant}")
}
