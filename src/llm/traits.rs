//! LLM 客户端与网关抽象
//!
//! - `LlmClient`：单次 (system, user) 调用，所有后端（OpenAI 兼容 / Mock）实现它
//! - `LlmGateway`：一批提示词并发调用，输出与输入等长，单条失败为 None
//! - `BatchJobGateway`：异步批处理任务（提交 / 轮询），未完成时返回 None 由外部调度器稍后重入

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{Message, PromptPair};

/// 后端调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Batch job error: {0}")]
    Batch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// (system, user) 便捷调用
    async fn complete_pair(&self, prompt: &PromptPair) -> Result<String, LlmError> {
        self.complete(&prompt.to_messages()).await
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 批量生成：返回与 prompts 等长的结果，调用失败的位置为 None（调用方按格式错误处理）
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(&self, prompts: &[PromptPair]) -> Vec<Option<String>>;
}

/// 异步批处理任务
#[async_trait]
pub trait BatchJobGateway: Send + Sync {
    /// 提交任务；已提交过同名任务时返回 Ok(None)
    async fn submit(&self, prompts: &[PromptPair], job_name: &str) -> Result<Option<String>, LlmError>;

    /// 拉取结果；任务未完成时返回 Ok(None)
    async fn fetch_results(&self, job_name: &str) -> Result<Option<Vec<Option<String>>>, LlmError>;
}
