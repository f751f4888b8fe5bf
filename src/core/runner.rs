//! 运行循环：同步模式逐轮跑到全部结束；批处理任务模式每次调用推进到第一个未完成的任务为止
//!
//! 两种模式都在每轮结束后整体重写记录文件。批处理模式先保存轮次状态再写记录，
//! 记录文件永远不会领先于轮次状态。

use std::path::Path;

use crate::agents::MessageRecord;
use crate::core::coordinator::{Coordinator, JobStatus, RoundStatus};
use crate::llm::{BatchJobGateway, LlmGateway};
use crate::records::{write_jsonl, RoundState};

/// 批处理任务模式一次调用的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchRunOutcome {
    Finished { rounds: u32 },
    /// 第 `round` 轮的任务还没完成；记录与轮次状态都未改动
    Pending { round: u32 },
}

/// 同步模式：直到没有活跃记录，返回跑过的轮数
pub async fn run_rounds(
    coordinator: &Coordinator,
    records: &mut [MessageRecord],
    gateway: &dyn LlmGateway,
    output: &Path,
) -> anyhow::Result<u32> {
    let mut round = 0;
    loop {
        let status = coordinator.process(records, gateway).await?;
        if status == RoundStatus::AllFinished {
            break;
        }
        round += 1;
        write_jsonl(output, records)?;
        tracing::info!("Round {} done, records saved to {}", round, output.display());
    }
    write_jsonl(output, records)?;
    Ok(round)
}

/// 批处理任务模式：任务名为轮次号，轮次号保存在 `round_state` 文件中
pub async fn run_batch_job(
    coordinator: &Coordinator,
    records: &mut [MessageRecord],
    gateway: &dyn BatchJobGateway,
    output: &Path,
    round_state: &Path,
) -> anyhow::Result<BatchRunOutcome> {
    let mut state = RoundState::load(round_state)?;
    let mut rounds = 0;
    loop {
        let status = coordinator
            .job_process(records, gateway, &state.job_name())
            .await?;
        if status == JobStatus::Pending {
            tracing::info!("Job for round {} not done, try again later", state.running_round);
            return Ok(BatchRunOutcome::Pending {
                round: state.running_round,
            });
        }
        // 先推进轮次再写记录：中断时记录停在上一轮，下次以新任务名重跑这一轮
        state.running_round += 1;
        state.save(round_state)?;
        write_jsonl(output, records)?;
        tracing::info!("Running round {} done", state.running_round - 1);
        if status == JobStatus::AllFinished {
            return Ok(BatchRunOutcome::Finished { rounds });
        }
        rounds += 1;
    }
}
