//! LLM 层：客户端抽象、并发网关、批处理任务与嵌入

pub mod batch;
pub mod embedding;
pub mod gateway;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use batch::{BatchReceipt, BatchStatus, OpenAiBatchClient};
pub use embedding::{create_embedder, EmbeddingProvider, HashingEmbedder, OpenAiEmbedder};
pub use gateway::{ConcurrentGateway, DEFAULT_MAX_CONCURRENCY};
pub use message::{Message, PromptPair, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{BatchJobGateway, LlmClient, LlmError, LlmGateway};

use crate::config::LlmSection;

/// 按 [llm] 配置创建客户端：provider = "mock" 或缺少 API Key 时回退到 Mock
pub fn create_client(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let key = cfg
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty());
    match (cfg.provider.as_str(), key) {
        ("mock", _) => {
            tracing::info!("Using mock LLM client");
            Arc::new(MockLlmClient)
        }
        (_, None) => {
            tracing::warn!("No API key configured, falling back to mock LLM client");
            Arc::new(MockLlmClient)
        }
        (_, Some(key)) => {
            tracing::info!("Using OpenAI-compatible client, model {}", cfg.model);
            Arc::new(
                OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, Some(&key))
                    .with_timeout(cfg.timeouts.request),
            )
        }
    }
}
