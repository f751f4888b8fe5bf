//! 并发批量网关：受限并发地把一批 PromptPair 发给 LlmClient
//!
//! 使用 `buffered(n)` 而非 `buffer_unordered`，输出顺序与请求顺序一致，
//! 协调器可按请求下标确定性地回写每条记录。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::llm::{LlmClient, LlmGateway, PromptPair};

/// 默认最大并发请求数
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

pub struct ConcurrentGateway {
    client: Arc<dyn LlmClient>,
    max_concurrency: usize,
}

impl ConcurrentGateway {
    pub fn new(client: Arc<dyn LlmClient>, max_concurrency: usize) -> Self {
        Self {
            client,
            max_concurrency: max_concurrency.max(1),
        }
    }
}

#[async_trait]
impl LlmGateway for ConcurrentGateway {
    async fn generate(&self, prompts: &[PromptPair]) -> Vec<Option<String>> {
        tracing::info!(
            "Generating {} responses (concurrency {})",
            prompts.len(),
            self.max_concurrency
        );
        let futures: Vec<_> = prompts
            .iter()
            .enumerate()
            .map(|(i, prompt)| {
                let client = self.client.clone();
                async move {
                    match client.complete_pair(prompt).await {
                        Ok(text) => Some(text),
                        Err(e) => {
                            tracing::warn!("Request {} failed: {}", i, e);
                            None
                        }
                    }
                }
            })
            .collect();
        stream::iter(futures)
            .buffered(self.max_concurrency)
            .collect()
            .await
    }
}
