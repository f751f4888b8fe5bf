//! 记忆条目：一次问答经验（正确 / 错误步骤、错误类型）加上分类与关联信息
//!
//! 创建后只有 tags / context / links / category（及其历史与遥测）会变，
//! 且只能经由进化策略或管理接口 `update` 修改。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::record::{lenient_list, lenient_string};
use crate::agents::MessageRecord;

/// 新条目的类别
pub const ORIGINAL_NOTE: &str = "Original note";
/// 参与过邻居更新的条目类别
pub const EVOLVE_NOTE: &str = "Evolve note";
/// context 为空时的默认值
pub const DEFAULT_CONTEXT: &str = "General";
/// 时间戳格式（分钟精度）
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// 写入新条目前的描述字段
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDraft {
    pub question_id: String,
    pub question_text: String,
    pub question_type: String,
    pub required_operations: Vec<String>,
    pub correct_steps: Vec<String>,
    pub wrong_steps: Vec<String>,
    pub correct_answer: String,
    pub model_answer: String,
    pub error_type: String,
    pub error_reason: String,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub context: String,
}

impl MemoryDraft {
    /// 从分析过的记录取字段：ground_truth → correct_answer，answer → model_answer
    pub fn from_record(record: &MessageRecord) -> Self {
        Self {
            question_id: record.qs_id.clone(),
            question_text: record.query.clone(),
            question_type: record.question_type.clone(),
            required_operations: record.required_operations.clone(),
            correct_steps: record.correct_steps.clone(),
            wrong_steps: record.wrong_steps.clone(),
            correct_answer: record.ground_truth.clone(),
            model_answer: record.answer.clone(),
            error_type: record.error_type.clone(),
            error_reason: record.error_reason.clone(),
            tags: record.tags.clone(),
            keywords: record.keywords.clone(),
            context: record.context.clone(),
        }
    }

    /// 条目正文：前四行必有，其余字段非空才出现
    pub fn build_content(&self) -> String {
        let mut lines = vec![
            format!("Question ID: {}", self.question_id),
            format!("Question: {}", self.question_text),
            format!("Question Type: {}", self.question_type),
            format!("Required operations: {}", self.required_operations.join(", ")),
        ];
        if !self.context.is_empty() {
            lines.push(format!("Context: {}", self.context));
        }
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        if !self.keywords.is_empty() {
            lines.push(format!("Keywords: {}", self.keywords.join(", ")));
        }
        if !self.correct_answer.is_empty() {
            lines.push(format!("Correct Answer: {}", self.correct_answer));
        }
        if !self.model_answer.is_empty() {
            lines.push(format!("Model Answer: {}", self.model_answer));
        }
        if !self.correct_steps.is_empty() {
            lines.push("Correct Steps:".to_string());
            lines.extend(self.correct_steps.iter().map(|s| format!("- {s}")));
        }
        if !self.wrong_steps.is_empty() {
            lines.push("Wrong Steps:".to_string());
            lines.extend(self.wrong_steps.iter().map(|s| format!("- {s}")));
        }
        if !self.error_type.is_empty() {
            lines.push(format!("Error Type: {}", self.error_type));
        }
        if !self.error_reason.is_empty() {
            lines.push(format!("Error Reason: {}", self.error_reason));
        }
        lines.join("\n")
    }
}

/// 记忆条目；所有字段带默认值，旧检查点里缺失或为 null 的字段读成空
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEntry {
    pub id: String,

    #[serde(deserialize_with = "lenient_string")]
    pub question_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub question_text: String,
    #[serde(deserialize_with = "lenient_string")]
    pub question_type: String,
    #[serde(deserialize_with = "lenient_list")]
    pub required_operations: Vec<String>,
    pub content: String,
    #[serde(deserialize_with = "lenient_list")]
    pub keywords: Vec<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub correct_answer: String,
    #[serde(deserialize_with = "lenient_string")]
    pub model_answer: String,
    #[serde(deserialize_with = "lenient_list")]
    pub correct_steps: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub wrong_steps: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub error_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub error_reason: String,

    pub category: String,
    #[serde(deserialize_with = "lenient_list")]
    pub tags: Vec<String>,
    pub tags_history: Vec<Vec<String>>,
    #[serde(deserialize_with = "lenient_string")]
    pub context: String,
    pub context_history: Vec<String>,

    /// 关联条目 id → 强度
    pub links: BTreeMap<String, u32>,

    pub evolution_history: Vec<Value>,
    pub strengthen_distance: Vec<Vec<f32>>,
    pub update_neighbour_distance: Vec<Vec<f32>>,

    pub timestamp: String,
    pub last_accessed: String,
}

impl MemoryEntry {
    pub fn from_draft(draft: MemoryDraft, content: impl Into<String>) -> Self {
        let now = now_timestamp();
        let context = if draft.context.trim().is_empty() {
            DEFAULT_CONTEXT.to_string()
        } else {
            draft.context
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question_id: draft.question_id,
            question_text: draft.question_text,
            question_type: draft.question_type,
            required_operations: draft.required_operations,
            content: content.into(),
            keywords: draft.keywords,
            correct_answer: draft.correct_answer,
            model_answer: draft.model_answer,
            correct_steps: draft.correct_steps,
            wrong_steps: draft.wrong_steps,
            error_type: draft.error_type,
            error_reason: draft.error_reason,
            category: ORIGINAL_NOTE.to_string(),
            tags: draft.tags,
            context,
            timestamp: now.clone(),
            last_accessed: now,
            ..Default::default()
        }
    }

    /// 写入相似度索引的元数据
    pub fn index_metadata(&self) -> IndexMetadata {
        IndexMetadata {
            id: self.id.clone(),
            content: self.content.clone(),
            keywords: self.keywords.clone(),
            links: self.links.clone(),
            timestamp: self.timestamp.clone(),
            last_accessed: self.last_accessed.clone(),
            context: self.context.clone(),
            evolution_history: self.evolution_history.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
            question_type: self.question_type.clone(),
            question_text: self.question_text.clone(),
            question_id: self.question_id.clone(),
            required_operations: self.required_operations.clone(),
            correct_steps: self.correct_steps.clone(),
            wrong_steps: self.wrong_steps.clone(),
            error_type: self.error_type.clone(),
            error_reason: self.error_reason.clone(),
        }
    }
}

/// 索引里随向量存放的元数据快照；检索结果读的是它而不是映射里的条目，
/// 所以邻居改写要等下一次全量重建才可见
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexMetadata {
    pub id: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub links: BTreeMap<String, u32>,
    pub timestamp: String,
    pub last_accessed: String,
    pub context: String,
    pub evolution_history: Vec<Value>,
    pub category: String,
    pub tags: Vec<String>,
    pub question_type: String,
    pub question_text: String,
    pub question_id: String,
    pub required_operations: Vec<String>,
    pub correct_steps: Vec<String>,
    pub wrong_steps: Vec<String>,
    pub error_type: String,
    pub error_reason: String,
}

/// `find_related` 的返回投影
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedMemory {
    pub id: String,
    pub question_text: String,
    pub question_type: String,
    pub required_operations: Vec<String>,
    pub correct_steps: Vec<String>,
    pub wrong_steps: Vec<String>,
    pub error_type: String,
    pub error_reason: String,
    pub distance: f32,
}

impl RelatedMemory {
    pub fn from_metadata(meta: &IndexMetadata, distance: f32) -> Self {
        Self {
            id: meta.id.clone(),
            question_text: meta.question_text.clone(),
            question_type: meta.question_type.clone(),
            required_operations: meta.required_operations.clone(),
            correct_steps: meta.correct_steps.clone(),
            wrong_steps: meta.wrong_steps.clone(),
            error_type: meta.error_type.clone(),
            error_reason: meta.error_reason.clone(),
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_content_skips_empty_fields() {
        let draft = MemoryDraft {
            question_id: "nt-1".into(),
            question_text: "how many medals?".into(),
            question_type: "counting".into(),
            required_operations: vec!["filter".into(), "count".into()],
            correct_steps: vec!["filter rows".into()],
            error_type: "None".into(),
            ..Default::default()
        };
        assert_eq!(
            draft.build_content(),
            "Question ID: nt-1\nQuestion: how many medals?\nQuestion Type: counting\n\
             Required operations: filter, count\nCorrect Steps:\n- filter rows\nError Type: None"
        );
    }

    #[test]
    fn test_new_entry_defaults() {
        let entry = MemoryEntry::from_draft(MemoryDraft::default(), "c");
        assert_eq!(entry.context, DEFAULT_CONTEXT);
        assert_eq!(entry.category, ORIGINAL_NOTE);
        assert_eq!(entry.timestamp.len(), 12);
        assert!(uuid::Uuid::parse_str(&entry.id).is_ok());
    }

    #[test]
    fn test_entry_roundtrip_with_empty_defaults() {
        let entry = MemoryEntry::from_draft(MemoryDraft::default(), "");
        let text = serde_json::to_string(&entry).unwrap();
        let back: MemoryEntry = serde_json::from_str(&text).unwrap();
        assert_eq!(back, entry);
        assert!(back.tags.is_empty() && back.links.is_empty() && back.evolution_history.is_empty());
    }

    #[test]
    fn test_null_fields_from_old_checkpoints() {
        let v = json!({"id": "m1", "content": "c", "error_type": null, "model_answer": null,
                       "required_operations": "filter", "links": {"m2": 2}});
        let entry: MemoryEntry = serde_json::from_value(v).unwrap();
        assert_eq!(entry.error_type, "");
        assert_eq!(entry.required_operations, vec!["filter"]);
        assert_eq!(entry.links.get("m2"), Some(&2));
    }
}
