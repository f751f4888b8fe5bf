//! 运行错误类型
//!
//! 只有配置类错误是致命的；格式错误与网关失败由各角色的重试 / 升级策略消化，
//! 轮次预算耗尽是正常终止，不会以错误形式出现。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Role {0} is not in the available role set")]
    RoleUnavailable(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Unknown evolve mode: {0}")]
    UnknownEvolveMode(String),

    #[error("No prompt template for dataset={dataset}, role={role}")]
    MissingPrompt { dataset: String, role: String },

    #[error("Job {job} returned {got} results for {expected} active records")]
    JobMismatch {
        job: String,
        expected: usize,
        got: usize,
    },

    #[error("Similarity index error: {0}")]
    Index(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
