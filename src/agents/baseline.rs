//! Baseline：单次直答，提示词变体由 `baseline_variant` 决定

use crate::agents::{
    parse_baseline_answer, Agent, BaselineOutcome, MessageRecord, RoleName, RunContext, SendTo,
    INVALID_FORMAT,
};
use crate::core::HiveError;
use crate::llm::PromptPair;

pub struct BaselineAgent;

impl Agent for BaselineAgent {
    fn role(&self) -> RoleName {
        RoleName::Baseline
    }

    fn prepare_prompt(&self, record: &MessageRecord, ctx: &RunContext) -> Result<PromptPair, HiveError> {
        Ok(ctx.prompt_for(RoleName::Baseline)?.render(&[
            ("table", record.origin_table.clone()),
            ("question", record.query.clone()),
        ]))
    }

    fn process_response(&self, record: &mut MessageRecord, response: Option<&str>, _ctx: &RunContext) {
        record.baseline_round += 1;
        let answer = match response {
            Some(text) => parse_baseline_answer(text),
            None => INVALID_FORMAT.to_string(),
        };
        record.baseline_result.push(BaselineOutcome {
            round: record.baseline_round,
            answer: answer.clone(),
        });
        record.answer = answer;
        record.send_to = SendTo::End;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Dataset, PromptBook, RoundLimits};

    fn ctx(variant: &str) -> RunContext {
        RunContext::new(
            Dataset::WikiTq,
            RoundLimits::default(),
            vec![RoleName::Baseline],
            RoleName::Baseline,
            variant,
            PromptBook::builtin().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_answer_extraction_and_end() {
        let ctx = ctx("cot");
        let mut rec = MessageRecord::new("q", "s", "t", RoleName::Baseline);
        BaselineAgent.process_response(
            &mut rec,
            Some("Rows 2 and 5 match. So the answer is: 1998.\nDone"),
            &ctx,
        );
        assert_eq!(rec.answer, "1998");
        assert_eq!(rec.baseline_round, 1);
        assert_eq!(rec.total_round, 0);
        assert!(rec.is_finished());
    }

    #[test]
    fn test_missing_response_is_invalid() {
        let ctx = ctx("zero_shot");
        let mut rec = MessageRecord::new("q", "s", "t", RoleName::Baseline);
        BaselineAgent.process_response(&mut rec, None, &ctx);
        assert_eq!(rec.answer, INVALID_FORMAT);
        assert_eq!(rec.baseline_result[0].answer, INVALID_FORMAT);
        assert!(rec.is_finished());
    }

    #[test]
    fn test_prompt_variant_selects_template() {
        let few = BaselineAgent
            .prepare_prompt(&MessageRecord::new("q", "QUESTION", "TABLE", RoleName::Baseline), &ctx("few_shot"))
            .unwrap();
        let zero = BaselineAgent
            .prepare_prompt(&MessageRecord::new("q", "QUESTION", "TABLE", RoleName::Baseline), &ctx("zero_shot"))
            .unwrap();
        assert!(few.user.contains("TABLE") && few.user.contains("QUESTION"));
        assert_ne!(few.user, zero.user);
    }
}
