//! 为待解问题挂载一条相关记忆（写入 `retrieved_memory` / `memory_distance`）

use crate::agents::MessageRecord;
use crate::core::HiveError;
use crate::memory::entry::RelatedMemory;
use crate::memory::store::MemoryStore;

pub const NO_RELATED_MEMORY: &str = "No related memory";
/// 没有命中时记录的距离
pub const FARTHEST_DISTANCE: f32 = 1.0;

pub fn retrieval_query(record: &MessageRecord) -> String {
    format!(
        "question: {} | columns: {}",
        record.query,
        record.column_list.join(", ")
    )
}

fn bullet_lines(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Solver 提示词中的记忆文本
pub fn format_memory(m: &RelatedMemory) -> String {
    format!(
        "Past Question: {}\nQuestion Type: {}\nRequired Operations: {}\n\n\
         Correct Reasoning Steps:\n{}\n\n\
         Mistake in previous attempt:\n{}\n\n\
         Error Type: {}\nError Reason: {}",
        m.question_text,
        m.question_type,
        m.required_operations.join(", "),
        bullet_lines(&m.correct_steps),
        bullet_lines(&m.wrong_steps),
        m.error_type,
        m.error_reason
    )
}

/// 多于一个命中时取第二个（第一个通常就是该问题自己的条目）。返回挂上记忆的记录数
pub fn attach_memories(
    store: &mut MemoryStore,
    records: &mut [MessageRecord],
    k: usize,
    threshold: f32,
) -> Result<usize, HiveError> {
    let mut attached = 0;
    for record in records.iter_mut() {
        let hits = store.find_related(&retrieval_query(record), k, threshold)?;
        let chosen = if hits.len() > 1 { hits.get(1) } else { hits.first() };
        match chosen {
            Some(top) => {
                record.retrieved_memory = format_memory(top);
                record.memory_distance = Some(top.distance);
                attached += 1;
            }
            None => {
                record.retrieved_memory = NO_RELATED_MEMORY.to_string();
                record.memory_distance = Some(FARTHEST_DISTANCE);
            }
        }
    }
    tracing::info!("Attached memories to {}/{} questions", attached, records.len());
    Ok(attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::RoleName;

    #[test]
    fn test_query_and_format() {
        let mut rec = MessageRecord::new("q1", "who won?", "t", RoleName::Solver);
        rec.column_list = vec!["year".into(), "winner".into()];
        assert_eq!(retrieval_query(&rec), "question: who won? | columns: year, winner");

        let m = RelatedMemory {
            question_text: "who lost?".into(),
            question_type: "lookup".into(),
            required_operations: vec!["filter".into()],
            correct_steps: vec!["a".into(), "b".into()],
            error_type: "None".into(),
            ..Default::default()
        };
        assert_eq!(
            format_memory(&m),
            "Past Question: who lost?\nQuestion Type: lookup\nRequired Operations: filter\n\n\
             Correct Reasoning Steps:\n- a\n- b\n\nMistake in previous attempt:\n\n\n\
             Error Type: None\nError Reason: "
        );
    }
}
