//! ResultAnalyze：对已结束的记录做一次事后分析，产出写入记忆的标注字段

use crate::agents::record::{value_to_list, value_to_text};
use crate::agents::{
    parse_response, render_value, Agent, MessageRecord, RoleName, RunContext, SendTo,
};
use crate::core::HiveError;
use crate::llm::PromptPair;

pub struct ResultAnalyzeAgent;

impl Agent for ResultAnalyzeAgent {
    fn role(&self) -> RoleName {
        RoleName::ResultAnalyze
    }

    fn prepare_prompt(&self, record: &MessageRecord, ctx: &RunContext) -> Result<PromptPair, HiveError> {
        let reasoner_history = record
            .reasoner_result
            .last()
            .map(|bucket| render_value(&bucket.inner_result_list))
            .unwrap_or_else(|| "[]".to_string());
        let reflector_feedback = record
            .reflector_result
            .last()
            .map(render_value)
            .unwrap_or_else(|| "None".to_string());

        Ok(ctx.prompt_for(RoleName::ResultAnalyze)?.render(&[
            ("question", record.query.clone()),
            ("table", record.origin_table.clone()),
            ("answer", record.answer.clone()),
            ("ground_truth", record.ground_truth.clone()),
            ("reasoner_history", reasoner_history),
            ("reflector_feedback", reflector_feedback),
        ]))
    }

    fn process_response(&self, record: &mut MessageRecord, response: Option<&str>, _ctx: &RunContext) {
        match parse_response(response) {
            Ok(map) => {
                let text = |key: &str| map.get(key).map(value_to_text).unwrap_or_default();
                let list = |key: &str| map.get(key).map(value_to_list).unwrap_or_default();
                record.question_type = text("question_type");
                record.required_operations = list("required_operations");
                record.context = text("context");
                record.keywords = list("keywords");
                record.tags = list("tags");
                record.correct_steps = list("correct_steps");
                record.wrong_steps = list("wrong_steps");
                record.error_type = text("error_type");
                record.error_reason = text("error_reason");
            }
            Err(e) => {
                tracing::warn!("Result analysis for {} unparseable: {}", record.qs_id, e);
                record.question_type = response.unwrap_or_default().to_string();
            }
        }
        record.send_to = SendTo::End;
    }
}
