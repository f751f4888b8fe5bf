//! 核心编排层：错误类型、协调器与运行循环

pub mod coordinator;
pub mod error;
pub mod runner;

pub use coordinator::{Coordinator, JobStatus, RoundStatus};
pub use error::HiveError;
pub use runner::{run_batch_job, run_rounds, BatchRunOutcome};
