//! 协调器：按同步轮次驱动一批记录
//!
//! 每轮：跳过已终止的记录 → 为活跃记录准备提示词 → 网关一次性并发调用 →
//! 按请求顺序逐条交给对应角色处理回复。单条记录的失败只影响它自己的路由，不会中断整批。

use crate::agents::{agent_for, MessageRecord, RunContext};
use crate::core::HiveError;
use crate::llm::{BatchJobGateway, LlmGateway, PromptPair};

/// 同步模式下一轮的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundStatus {
    /// 没有活跃记录
    AllFinished,
    Progressed,
}

/// 批处理任务模式下一轮的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    AllFinished,
    Progressed,
    /// 任务尚未完成，本轮什么都没改
    Pending,
}

pub struct Coordinator {
    ctx: RunContext,
}

impl Coordinator {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// 活跃记录的下标及其提示词（一一对应）
    pub fn prepare_batch(
        &self,
        records: &[MessageRecord],
    ) -> Result<(Vec<usize>, Vec<PromptPair>), HiveError> {
        let mut active = Vec::new();
        let mut prompts = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let Some(role) = record.send_to.role() else {
                continue;
            };
            if !self.ctx.is_available(role) {
                return Err(HiveError::RoleUnavailable(role.to_string()));
            }
            prompts.push(agent_for(role).prepare_prompt(record, &self.ctx)?);
            active.push(i);
        }
        tracing::info!("Remaining active records: {}", active.len());
        Ok((active, prompts))
    }

    /// 按请求顺序回写；回复缺位按调用失败处理
    pub fn process_responses(
        &self,
        records: &mut [MessageRecord],
        active: &[usize],
        responses: &[Option<String>],
    ) {
        if responses.len() != active.len() {
            tracing::warn!(
                "Got {} responses for {} requests, missing ones count as failures",
                responses.len(),
                active.len()
            );
        }
        for (pos, &i) in active.iter().enumerate() {
            let record = &mut records[i];
            let Some(role) = record.send_to.role() else {
                continue;
            };
            let response = responses.get(pos).and_then(|r| r.as_deref());
            agent_for(role).process_response(record, response, &self.ctx);
        }
    }

    /// 同步模式跑一轮
    pub async fn process(
        &self,
        records: &mut [MessageRecord],
        gateway: &dyn LlmGateway,
    ) -> Result<RoundStatus, HiveError> {
        let (active, prompts) = self.prepare_batch(records)?;
        if active.is_empty() {
            return Ok(RoundStatus::AllFinished);
        }
        let responses = gateway.generate(&prompts).await;
        self.process_responses(records, &active, &responses);
        Ok(RoundStatus::Progressed)
    }

    /// 批处理任务模式跑一轮：提交（已提交则跳过）后立即尝试拉取结果
    pub async fn job_process(
        &self,
        records: &mut [MessageRecord],
        gateway: &dyn BatchJobGateway,
        job_name: &str,
    ) -> Result<JobStatus, HiveError> {
        let (active, prompts) = self.prepare_batch(records)?;
        if active.is_empty() {
            return Ok(JobStatus::AllFinished);
        }
        if gateway.submit(&prompts, job_name).await?.is_none() {
            tracing::info!("Job {} already submitted, fetching results", job_name);
        }
        let Some(responses) = gateway.fetch_results(job_name).await? else {
            tracing::info!("Job {} not finished yet", job_name);
            return Ok(JobStatus::Pending);
        };
        // 结果条数必须与本轮活跃记录一致，否则是别的轮次留下的任务
        if responses.len() != active.len() {
            return Err(HiveError::JobMismatch {
                job: job_name.to_string(),
                expected: active.len(),
                got: responses.len(),
            });
        }
        self.process_responses(records, &active, &responses);
        Ok(JobStatus::Progressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::agents::{Dataset, PromptBook, RoleName, RoundLimits, SendTo};
    use crate::llm::{ConcurrentGateway, ScriptedLlmClient};

    fn coordinator(available: &[RoleName], start: RoleName) -> Coordinator {
        Coordinator::new(
            RunContext::new(
                Dataset::WikiTq,
                RoundLimits::default(),
                available.to_vec(),
                start,
                "zero_shot",
                PromptBook::builtin().unwrap(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_prepare_skips_finished_records() {
        let c = coordinator(&[RoleName::Solver], RoleName::Solver);
        let mut done = MessageRecord::new("b", "q", "t", RoleName::Solver);
        done.send_to = SendTo::End;
        let records = vec![MessageRecord::new("a", "q", "t", RoleName::Solver), done];
        let (active, prompts) = c.prepare_batch(&records).unwrap();
        assert_eq!(active, vec![0]);
        assert_eq!(prompts.len(), 1);
    }

    #[test]
    fn test_unavailable_role_is_rejected() {
        let c = coordinator(&[RoleName::Solver], RoleName::Solver);
        let records = vec![MessageRecord::new("a", "q", "t", RoleName::Checker)];
        assert!(matches!(
            c.prepare_batch(&records),
            Err(HiveError::RoleUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_baseline_batch_finishes_in_one_round() {
        let c = coordinator(&[RoleName::Baseline], RoleName::Baseline);
        let client = Arc::new(ScriptedLlmClient::new(["The answer is: 3."]));
        client.push_failure("timeout");
        let gateway = ConcurrentGateway::new(client, 1);
        let mut records = vec![
            MessageRecord::new("a", "q", "t", RoleName::Baseline),
            MessageRecord::new("b", "q", "t", RoleName::Baseline),
        ];
        assert_eq!(c.process(&mut records, &gateway).await.unwrap(), RoundStatus::Progressed);
        assert_eq!(records[0].answer, "3");
        assert_eq!(records[1].answer, crate::agents::INVALID_FORMAT);
        assert_eq!(c.process(&mut records, &gateway).await.unwrap(), RoundStatus::AllFinished);
    }
}
