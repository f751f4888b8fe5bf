//! Solver：内外两层循环的主推理角色
//!
//! 计数：`first_round_in_loop` 为真时外层 +1、内层清零、追加空桶、清除标记；随后内层 +1、总轮次 +1。
//!
//! 路由（严格优先级，原地重试优先于升级，升级优先进入下一角色而非重启外层）：
//! 1. 解析失败且内层有余 → Solver
//! 2. 解析失败且内层耗尽 → Checker（可用时），否则新外层轮次或 End
//! 3. 解析成功且答案非空 → Checker（可用时），否则 End
//! 4. 解析成功、答案为空、内层有余 → Solver
//! 5. 解析成功、答案为空、内层耗尽 → 新外层轮次或 End

use serde_json::Value;

use crate::agents::record::value_to_text;
use crate::agents::{
    parse_response, render_value, Agent, InnerAttempt, MessageRecord, OuterRound, RoleName,
    RunContext, SendTo, INVALID_FORMAT, NOT_CHANGED, NOT_READY,
};
use crate::core::HiveError;
use crate::llm::PromptPair;

pub struct SolverAgent;

/// 动作转文本：字符串去空白，对象展开为 `k=v, ...`，其余为空
pub fn stringify_action(action: &Value) -> String {
    match action {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, value_to_text(v)))
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

/// 当前外层轮次的动作历史，形如 "1. filter rows"；外层开头或为空时为 "None"
pub fn action_history(record: &MessageRecord) -> String {
    if record.first_round_in_loop {
        return "None".to_string();
    }
    let lines: Vec<String> = record
        .current_bucket()
        .map(|bucket: &OuterRound| {
            bucket
                .inner_result_list
                .iter()
                .filter_map(|item| {
                    let action = stringify_action(&item.action);
                    (!action.is_empty()).then(|| format!("{}. {}", item.inner_round, action))
                })
                .collect()
        })
        .unwrap_or_default();
    if lines.is_empty() {
        "None".to_string()
    } else {
        lines.join("\n")
    }
}

/// 提示词里的表格：外层开头用原表，否则用当前表（为空时回退原表）
fn working_table(record: &MessageRecord) -> &str {
    if record.first_round_in_loop || record.current_table.trim().is_empty() {
        &record.origin_table
    } else {
        &record.current_table
    }
}

impl Agent for SolverAgent {
    fn role(&self) -> RoleName {
        RoleName::Solver
    }

    fn prepare_prompt(&self, record: &MessageRecord, ctx: &RunContext) -> Result<PromptPair, HiveError> {
        let this_round = record.inner_reasoner_round + 1;
        let rounds_left = ctx.limits.max_inner.saturating_sub(this_round);
        let reflector_feedback = record
            .reflector_result
            .last()
            .map(render_value)
            .unwrap_or_default();

        Ok(ctx.prompt_for(RoleName::Solver)?.render(&[
            ("related_memory", record.retrieved_memory.clone()),
            ("table", working_table(record).to_string()),
            ("question", record.query.clone()),
            ("action_history", action_history(record)),
            ("optional_info", reflector_feedback),
            ("this_round", this_round.to_string()),
            ("rounds_left", rounds_left.to_string()),
        ]))
    }

    fn process_response(&self, record: &mut MessageRecord, response: Option<&str>, ctx: &RunContext) {
        record.total_round += 1;
        if record.first_round_in_loop {
            record.outer_reasoner_round += 1;
            record.inner_reasoner_round = 0;
            record.first_round_in_loop = false;
            record.reasoner_result.push(OuterRound {
                outer_round: record.outer_reasoner_round,
                inner_result_list: Vec::new(),
            });
        }
        record.inner_reasoner_round += 1;

        let parsed = parse_response(response);
        let attempt = match &parsed {
            Ok(map) => {
                let table = map.get("intermediate_table").map(value_to_text).unwrap_or_default();
                if !table.trim().is_empty() && !table.contains(NOT_CHANGED) {
                    record.current_table = table.clone();
                }
                InnerAttempt {
                    inner_round: record.inner_reasoner_round,
                    thought: map.get("thought").map(value_to_text).unwrap_or_default(),
                    action: map.get("action").cloned().unwrap_or(Value::String(String::new())),
                    intermediate_table: table,
                    answer: map
                        .get("answer")
                        .map(value_to_text)
                        .unwrap_or_default()
                        .replace(NOT_READY, "")
                        .trim()
                        .to_string(),
                    llm_response: response.map(String::from),
                }
            }
            Err(e) => {
                tracing::debug!("Solver response for {} unparseable: {}", record.qs_id, e);
                InnerAttempt {
                    inner_round: record.inner_reasoner_round,
                    action: Value::String(String::new()),
                    answer: INVALID_FORMAT.to_string(),
                    llm_response: response.map(String::from),
                    ..Default::default()
                }
            }
        };
        record.answer = attempt.answer.clone();
        record.current_bucket_mut().inner_result_list.push(attempt);

        let limits = &ctx.limits;
        let inner_left = record.inner_reasoner_round < limits.max_inner;
        let checker = ctx.is_available(RoleName::Checker);
        match parsed {
            Err(_) if inner_left => record.send_to = SendTo::Role(RoleName::Solver),
            Err(_) if checker => record.send_to = SendTo::Role(RoleName::Checker),
            Err(_) => record.restart_or_end(limits.max_outer),
            Ok(_) if !record.answer.is_empty() => {
                record.send_to = if checker {
                    SendTo::Role(RoleName::Checker)
                } else {
                    SendTo::End
                };
            }
            Ok(_) if inner_left => record.send_to = SendTo::Role(RoleName::Solver),
            Ok(_) => record.restart_or_end(limits.max_outer),
        }
        tracing::debug!("Solver routed {} to {}", record.qs_id, record.send_to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Dataset, PromptBook, RoundLimits};
    use serde_json::json;

    fn ctx(available: &[RoleName]) -> RunContext {
        RunContext::new(
            Dataset::WikiTq,
            RoundLimits::default(),
            available.to_vec(),
            RoleName::Solver,
            "zero_shot",
            PromptBook::builtin().unwrap(),
        )
        .unwrap()
    }

    fn reply(action: &str, table: &str, answer: &str) -> String {
        json!({"thought": "t", "action": action, "intermediate_table": table, "answer": answer})
            .to_string()
    }

    #[test]
    fn test_first_round_opens_bucket() {
        let ctx = ctx(&[RoleName::Solver]);
        let mut rec = MessageRecord::new("q1", "how many?", "|a|\n|1|", RoleName::Solver);
        SolverAgent.process_response(&mut rec, Some(&reply("filter", "|a|", "<NOT_READY>")), &ctx);
        assert_eq!(rec.outer_reasoner_round, 1);
        assert_eq!(rec.reasoner_result.len(), 1);
        assert!(!rec.first_round_in_loop);
        assert_eq!(rec.current_table, "|a|");
        assert_eq!(rec.answer, "");
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Solver));

        // 非外层开头：外层计数不变
        SolverAgent.process_response(&mut rec, Some(&reply("count", NOT_CHANGED, "1")), &ctx);
        assert_eq!(rec.outer_reasoner_round, 1);
        assert_eq!(rec.reasoner_result[0].inner_result_list.len(), 2);
        assert_eq!(rec.current_table, "|a|");
        assert_eq!(rec.answer, "1");
        assert_eq!(rec.send_to, SendTo::End);
    }

    #[test]
    fn test_fresh_outer_round_resets_inner_counter() {
        let ctx = ctx(&[RoleName::Solver]);
        let mut rec = MessageRecord::new("q1", "how many?", "|a|", RoleName::Solver);
        rec.first_round_in_loop = true;
        rec.inner_reasoner_round = 3;
        SolverAgent.process_response(&mut rec, Some(&reply("filter", NOT_CHANGED, NOT_READY)), &ctx);
        assert_eq!(rec.inner_reasoner_round, 1);
        assert_eq!(rec.outer_reasoner_round, 1);
        assert_eq!(rec.reasoner_result[0].inner_result_list[0].inner_round, 1);
        // 内层还有余量，原地重试
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Solver));
    }

    #[test]
    fn test_answer_goes_to_checker_when_available() {
        let ctx = ctx(&[RoleName::Solver, RoleName::Checker]);
        let mut rec = MessageRecord::new("q1", "q", "t", RoleName::Solver);
        SolverAgent.process_response(&mut rec, Some(&reply("a", NOT_CHANGED, "7")), &ctx);
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Checker));
    }

    #[test]
    fn test_five_failures_restart_outer_round() {
        let ctx = ctx(&[RoleName::Solver]);
        let mut rec = MessageRecord::new("q1", "q", "t", RoleName::Solver);
        for i in 1..=5 {
            SolverAgent.process_response(&mut rec, Some("garbage"), &ctx);
            if i < 5 {
                assert_eq!(rec.send_to, SendTo::Role(RoleName::Solver));
                assert!(!rec.first_round_in_loop);
            }
        }
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Solver));
        assert!(rec.first_round_in_loop);
        assert_eq!(rec.inner_reasoner_round, 0);
        assert_eq!(rec.outer_reasoner_round, 1);
        assert_eq!(rec.answer, INVALID_FORMAT);

        SolverAgent.process_response(&mut rec, None, &ctx);
        assert_eq!(rec.outer_reasoner_round, 2);
        assert_eq!(rec.reasoner_result.len(), 2);
    }

    #[test]
    fn test_exhausted_failures_escalate_to_checker() {
        let ctx = ctx(&[RoleName::Solver, RoleName::Checker]);
        let mut rec = MessageRecord::new("q1", "q", "t", RoleName::Solver);
        for _ in 0..5 {
            SolverAgent.process_response(&mut rec, None, &ctx);
        }
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Checker));
    }

    #[test]
    fn test_outer_budget_exhaustion_ends() {
        let ctx = ctx(&[RoleName::Solver]);
        let mut rec = MessageRecord::new("q1", "q", "t", RoleName::Solver);
        let mut steps = 0;
        while !rec.is_finished() {
            SolverAgent.process_response(&mut rec, Some(&reply("", NOT_CHANGED, NOT_READY)), &ctx);
            steps += 1;
            assert!(steps <= 20);
        }
        assert_eq!(steps, 20);
        assert_eq!(rec.outer_reasoner_round, 4);
        assert_eq!(rec.total_round, 20);
    }

    #[test]
    fn test_prompt_uses_origin_table_and_history() {
        let ctx = ctx(&[RoleName::Solver]);
        let mut rec = MessageRecord::new("q1", "which year?", "ORIGIN", RoleName::Solver);
        let first = SolverAgent.prepare_prompt(&rec, &ctx).unwrap();
        assert!(first.user.contains("ORIGIN"));
        assert!(first.user.contains("which year?"));

        SolverAgent.process_response(
            &mut rec,
            Some(&json!({"thought": "t", "action": {"col": "year", "op": "filter"},
                         "intermediate_table": "FILTERED", "answer": ""}).to_string()),
            &ctx,
        );
        let second = SolverAgent.prepare_prompt(&rec, &ctx).unwrap();
        assert!(second.user.contains("FILTERED"));
        assert!(second.user.contains("1. col=year, op=filter"));
        assert_eq!(rec.inner_reasoner_round, 1);
    }

    #[test]
    fn test_action_history_none_at_loop_start() {
        let rec = MessageRecord::new("q1", "q", "t", RoleName::Solver);
        assert_eq!(action_history(&rec), "None");
    }
}
