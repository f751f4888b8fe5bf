//! 相似度索引：文本 → 向量，按余弦距离（1 - cos）取 k 近邻，命中携带元数据快照

use std::sync::Arc;

use crate::core::HiveError;
use crate::llm::EmbeddingProvider;
use crate::memory::entry::IndexMetadata;

/// 一次检索命中
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub distance: f32,
    pub metadata: IndexMetadata,
}

/// k 近邻索引
pub trait SimilarityIndex: Send + Sync {
    /// 写入文档；同 id 已存在时替换
    fn add(&mut self, id: &str, document: &str, metadata: IndexMetadata) -> Result<(), HiveError>;

    fn delete(&mut self, id: &str) -> bool;

    /// 按距离升序返回至多 k 个命中
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, HiveError>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct IndexedDoc {
    id: String,
    embedding: Vec<f32>,
    metadata: IndexMetadata,
}

/// 内存向量索引（线性扫描）
pub struct VectorIndex {
    docs: Vec<IndexedDoc>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            docs: Vec::new(),
            embedder,
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, HiveError> {
        self.embedder.embed_sync(text).map_err(HiveError::Index)
    }
}

impl SimilarityIndex for VectorIndex {
    fn add(&mut self, id: &str, document: &str, metadata: IndexMetadata) -> Result<(), HiveError> {
        let embedding = self.embed(document)?;
        self.delete(id);
        self.docs.push(IndexedDoc {
            id: id.to_string(),
            embedding,
            metadata,
        });
        Ok(())
    }

    fn delete(&mut self, id: &str) -> bool {
        let before = self.docs.len();
        self.docs.retain(|d| d.id != id);
        self.docs.len() != before
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, HiveError> {
        if k == 0 || self.docs.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embed(query)?;
        let mut scored: Vec<(f32, &IndexedDoc)> = self
            .docs
            .iter()
            .map(|doc| (1.0 - cosine_similarity(&query, &doc.embedding), doc))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, doc)| SearchHit {
                id: doc.id.clone(),
                distance,
                metadata: doc.metadata.clone(),
            })
            .collect())
    }

    fn clear(&mut self) {
        self.docs.clear();
    }

    fn len(&self) -> usize {
        self.docs.len()
    }
}

/// 余弦相似度；任一向量为零或维度不符时为 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
