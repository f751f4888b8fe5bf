//! Checker：按评分细则打分，分数恰好等于数据集通过分时接受答案

use serde_json::{Map, Value};

use crate::agents::{
    parse_response, Agent, CheckerOutcome, MessageRecord, RoleName, RunContext, SendTo,
};
use crate::core::HiveError;
use crate::llm::PromptPair;

/// 解析失败时记录的分数
pub const INVALID_SCORE: i64 = -100;

pub struct CheckerAgent;

/// `feedback.*.score` 求和；只计整数分，缺失或非整数按 0
pub fn checker_score(response: &Map<String, Value>) -> i64 {
    response
        .get("feedback")
        .and_then(Value::as_object)
        .map(|feedback| {
            feedback
                .values()
                .filter_map(|aspect| aspect.get("score"))
                .filter_map(Value::as_i64)
                .sum()
        })
        .unwrap_or(0)
}

impl Agent for CheckerAgent {
    fn role(&self) -> RoleName {
        RoleName::Checker
    }

    fn prepare_prompt(&self, record: &MessageRecord, ctx: &RunContext) -> Result<PromptPair, HiveError> {
        Ok(ctx.prompt_for(RoleName::Checker)?.render(&[
            ("table", record.origin_table.clone()),
            ("question", record.query.clone()),
            ("answer", record.answer.clone()),
        ]))
    }

    fn process_response(&self, record: &mut MessageRecord, response: Option<&str>, ctx: &RunContext) {
        record.total_round += 1;
        record.checker_round += 1;

        let parsed = parse_response(response);
        let (feedback, score) = match &parsed {
            Ok(map) => (
                map.get("feedback").cloned().unwrap_or_else(|| Value::Object(Map::new())),
                checker_score(map),
            ),
            Err(_) => (
                Value::String(response.unwrap_or_default().to_string()),
                INVALID_SCORE,
            ),
        };
        record.checker_result.push(CheckerOutcome {
            round: record.checker_round,
            feedback,
            checker_score: score,
        });

        if parsed.is_err() {
            record.send_to = if record.checker_round < ctx.limits.max_checker {
                SendTo::Role(RoleName::Checker)
            } else {
                SendTo::End
            };
        } else if score == ctx.checker_points() {
            record.send_to = SendTo::End;
        } else if ctx.is_available(RoleName::Reflector) {
            record.send_to = SendTo::Role(RoleName::Reflector);
        } else {
            record.restart_or_end(ctx.limits.max_outer);
        }
        tracing::debug!(
            "Checker scored {} for {}, routed to {}",
            score,
            record.qs_id,
            record.send_to
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Dataset, PromptBook, RoundLimits};
    use serde_json::json;

    fn ctx(dataset: Dataset, available: &[RoleName]) -> RunContext {
        RunContext::new(
            dataset,
            RoundLimits::default(),
            available.to_vec(),
            RoleName::Solver,
            "zero_shot",
            PromptBook::builtin().unwrap(),
        )
        .unwrap()
    }

    fn wiki_reply(a: i64, b: i64, c: Value) -> String {
        json!({"feedback": {
            "answer_type_checking": {"score": a, "comments": ""},
            "format_validation": {"score": b, "comments": ""},
            "logical_consistency": {"score": c, "comments": ""},
            "summary": {"total_score": 99, "final_comments": ""}
        }})
        .to_string()
    }

    #[test]
    fn test_score_ignores_non_integer() {
        let map = parse_response(Some(&wiki_reply(2, 2, json!("2")))).unwrap();
        assert_eq!(checker_score(&map), 4);
        let map = parse_response(Some(&wiki_reply(2, 1, json!(1.5)))).unwrap();
        assert_eq!(checker_score(&map), 3);
    }

    #[test]
    fn test_tabfact_exact_threshold_ends() {
        let ctx = ctx(Dataset::TabFact, &[RoleName::Solver, RoleName::Checker, RoleName::Reflector]);
        let mut rec = MessageRecord::new("q", "s", "t", RoleName::Checker);
        rec.outer_reasoner_round = 1;
        let reply = json!({"feedback": {"verdict": {"score": 1}}}).to_string();
        CheckerAgent.process_response(&mut rec, Some(&reply), &ctx);
        assert_eq!(rec.send_to, SendTo::End);
        assert_eq!(rec.checker_result[0].checker_score, 1);
    }

    #[test]
    fn test_below_threshold_goes_to_reflector_or_restarts() {
        let with_reflector = ctx(Dataset::WikiTq, &[RoleName::Solver, RoleName::Checker, RoleName::Reflector]);
        let mut rec = MessageRecord::new("q", "s", "t", RoleName::Checker);
        rec.outer_reasoner_round = 1;
        CheckerAgent.process_response(&mut rec, Some(&wiki_reply(2, 2, json!(1))), &with_reflector);
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Reflector));

        let without = ctx(Dataset::WikiTq, &[RoleName::Solver, RoleName::Checker]);
        let mut rec = MessageRecord::new("q", "s", "t", RoleName::Checker);
        rec.outer_reasoner_round = 1;
        rec.first_round_in_loop = false;
        rec.inner_reasoner_round = 3;
        CheckerAgent.process_response(&mut rec, Some(&wiki_reply(0, 0, json!(0))), &without);
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Solver));
        assert!(rec.first_round_in_loop);
        assert_eq!(rec.inner_reasoner_round, 0);
    }

    #[test]
    fn test_failures_retry_then_end() {
        let ctx = ctx(Dataset::WikiTq, &[RoleName::Solver, RoleName::Checker]);
        let mut rec = MessageRecord::new("q", "s", "t", RoleName::Checker);
        for _ in 0..4 {
            CheckerAgent.process_response(&mut rec, Some("not json"), &ctx);
            assert_eq!(rec.send_to, SendTo::Role(RoleName::Checker));
        }
        CheckerAgent.process_response(&mut rec, None, &ctx);
        assert_eq!(rec.send_to, SendTo::End);
        assert_eq!(rec.checker_result[0].checker_score, INVALID_SCORE);
        assert_eq!(rec.checker_result[0].feedback, json!("not json"));
        assert_eq!(rec.total_round, 5);
    }
}
