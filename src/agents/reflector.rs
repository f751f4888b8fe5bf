//! Reflector：诊断失败原因并给出改进计划；成功后总是开启新的外层轮次（预算内）

use serde_json::Value;

use crate::agents::record::value_to_text;
use crate::agents::{
    parse_response, render_value, Agent, MessageRecord, ReflectorOutcome, RoleName, RunContext,
    SendTo,
};
use crate::core::HiveError;
use crate::llm::PromptPair;

pub struct ReflectorAgent;

impl Agent for ReflectorAgent {
    fn role(&self) -> RoleName {
        RoleName::Reflector
    }

    fn prepare_prompt(&self, record: &MessageRecord, ctx: &RunContext) -> Result<PromptPair, HiveError> {
        let reasoner_history = record
            .reasoner_result
            .last()
            .map(|bucket| render_value(&bucket.inner_result_list))
            .unwrap_or_default();
        let checker_feedback = record
            .checker_result
            .last()
            .map(|c| match &c.feedback {
                Value::String(s) => s.clone(),
                other => render_value(other),
            })
            .unwrap_or_default();

        Ok(ctx.prompt_for(RoleName::Reflector)?.render(&[
            ("table", record.origin_table.clone()),
            ("question", record.query.clone()),
            ("reasoner_history", reasoner_history),
            ("answer", record.answer.clone()),
            ("checker_feedback", checker_feedback),
        ]))
    }

    fn process_response(&self, record: &mut MessageRecord, response: Option<&str>, ctx: &RunContext) {
        record.total_round += 1;
        record.reflector_round += 1;

        match parse_response(response) {
            Ok(map) => {
                let field = |key: &str| {
                    map.get(key)
                        .cloned()
                        .unwrap_or_else(|| Value::String(String::new()))
                };
                record.reflector_result.push(ReflectorOutcome {
                    round: record.reflector_round,
                    diagnosis: field("diagnosis"),
                    improvement_plan: field("improvement_plan"),
                });
                if let Some(last) = record.reflector_result.last() {
                    tracing::debug!("Reflector for {}: {}", record.qs_id, summarize(last));
                }
                record.restart_or_end(ctx.limits.max_outer);
            }
            Err(_) => {
                record.reflector_result.push(ReflectorOutcome {
                    round: record.reflector_round,
                    diagnosis: Value::String(response.unwrap_or_default().to_string()),
                    improvement_plan: Value::String(String::new()),
                });
                record.send_to = if record.reflector_round < ctx.limits.max_reflector {
                    SendTo::Role(RoleName::Reflector)
                } else {
                    SendTo::End
                };
            }
        }
        tracing::debug!("Reflector routed {} to {}", record.qs_id, record.send_to);
    }
}

/// 反思结果的简短文本（日志与摘要用）
pub fn summarize(outcome: &ReflectorOutcome) -> String {
    format!(
        "diagnosis: {}; plan: {}",
        value_to_text(&outcome.diagnosis),
        value_to_text(&outcome.improvement_plan)
    )
}
