//! 答案评测：归一化后与 ground_truth 比较，统计准确率

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::agents::parser::clean_token;
use crate::agents::MessageRecord;
use crate::records::write_jsonl;

/// 去空白、小写、去换行与首尾标点；类布尔词统一为 true / false
pub fn normalize_answer(text: &str) -> String {
    let cleaned = clean_token(text);
    match cleaned.as_str() {
        "yes" | "true" | "correct" => "true".to_string(),
        "no" | "false" | "incorrect" => "false".to_string(),
        _ => cleaned,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// 明细行：原记录字段加上 clean_answer / is_correct
#[derive(Serialize)]
struct EvaluatedRow<'a> {
    #[serde(flatten)]
    record: &'a MessageRecord,
    clean_answer: String,
    is_correct: bool,
}

pub fn is_correct(record: &MessageRecord) -> bool {
    normalize_answer(&record.answer) == normalize_answer(&record.ground_truth)
}

pub fn evaluate(records: &[MessageRecord]) -> EvaluationReport {
    let total = records.len();
    let correct = records.iter().filter(|r| is_correct(r)).count();
    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };
    EvaluationReport {
        total,
        correct,
        accuracy,
    }
}

/// 评测并可选写出明细 JSONL
pub fn evaluate_and_save(
    records: &[MessageRecord],
    save_path: Option<&Path>,
) -> anyhow::Result<EvaluationReport> {
    let report = evaluate(records);
    tracing::info!(
        "Total: {}, Correct: {}, Accuracy: {:.2}%",
        report.total,
        report.correct,
        report.accuracy * 100.0
    );
    if let Some(path) = save_path {
        let rows: Vec<Value> = records
            .iter()
            .map(|record| {
                serde_json::to_value(EvaluatedRow {
                    record,
                    clean_answer: normalize_answer(&record.answer),
                    is_correct: is_correct(record),
                })
            })
            .collect::<Result<_, _>>()?;
        write_jsonl(path, &rows)?;
        tracing::info!("Saved evaluation rows to {}", path.display());
    }
    Ok(report)
}
