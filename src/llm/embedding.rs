//! 嵌入 API：供记忆相似度索引使用
//!
//! - `OpenAiEmbedder`：调用 OpenAI 兼容的 /embeddings 端点
//! - `HashingEmbedder`：本地确定性嵌入（分词 + 特征哈希），离线运行与测试使用

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;

use crate::memory::tokenizer;

/// 可从 sync 上下文调用的嵌入提供方
pub trait EmbeddingProvider: Send + Sync {
    /// 将文本编码为向量；失败时返回错误字符串
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    pub async fn embed_async(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    // 需要多线程 runtime（block_in_place）
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = text.to_string();
        let this = self.clone();
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(this.embed_async(&text))
        })
    }
}

/// 默认哈希嵌入维度
pub const DEFAULT_HASH_DIM: usize = 256;

/// 特征哈希嵌入：对分词结果做 FNV-1a 哈希映射到固定维度，L2 归一化。
/// 相同文本总得到相同向量；无共同词的文本余弦相似度为 0。
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in token.as_bytes() {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, String> {
        let mut vec = vec![0.0f32; self.dim];
        for token in tokenizer::tokenize(text) {
            let h = fnv1a(&token);
            let slot = (h % self.dim as u64) as usize;
            // 高位决定符号，减少碰撞带来的偏置
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vec[slot] += sign;
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vec.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vec)
    }
}

/// 按配置创建嵌入提供方：provider = "openai" 且有 API Key 时用远端，否则回退到哈希嵌入
pub fn create_embedder(
    provider: &str,
    base_url: Option<&str>,
    model: &str,
    api_key: Option<&str>,
) -> Arc<dyn EmbeddingProvider> {
    let key = api_key
        .map(String::from)
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty());
    match (provider, key) {
        ("openai", Some(key)) => Arc::new(OpenAiEmbedder::new(base_url, model, &key)),
        ("openai", None) => {
            tracing::warn!("Embedding provider is openai but no API key is set, using hashing embedder");
            Arc::new(HashingEmbedder::default())
        }
        _ => Arc::new(HashingEmbedder::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed_sync("how many gold medals did china win").unwrap();
        let b = e.embed_sync("how many gold medals did china win").unwrap();
        assert_eq!(a, b);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_related_texts_are_closer() {
        let e = HashingEmbedder::default();
        let q = e.embed_sync("total gold medals by country").unwrap();
        let near = e.embed_sync("gold medals won by each country").unwrap();
        let far = e.embed_sync("release year of the album").unwrap();
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn test_empty_text_gives_zero_vector() {
        let v = HashingEmbedder::new(8).embed_sync("   ").unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }
}
