//! 记忆库：id → 条目映射 + 相似度索引 + 进化策略 + 运行计数
//!
//! 不变式：映射中的每个条目都在索引里。进化对邻居的改写只落在映射上，
//! 每 `evo_threshold` 次进化做一次全量重建后索引元数据才同步；管理接口的 update / delete 立即同步。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agents::PromptBook;
use crate::config::AppConfig;
use crate::core::HiveError;
use crate::llm::{create_embedder, LlmClient};
use crate::memory::entry::{MemoryDraft, MemoryEntry, RelatedMemory};
use crate::memory::evolution::Evolver;
use crate::memory::index::{SimilarityIndex, VectorIndex};

/// 运行计数；只在 `add_entry` / `find_related` 中变化（以及从检查点恢复）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    /// 发生进化的次数
    pub evol_count: u64,
    /// 进化累计影响的条目数
    pub evol_mem_count: u64,
    /// 条目被 `find_related` 命中的次数
    pub retrieval_count: BTreeMap<String, u64>,
}

/// 管理接口可改的字段；None 表示不改
#[derive(Clone, Debug, Default)]
pub struct MemoryPatch {
    pub tags: Option<Vec<String>>,
    pub context: Option<String>,
    pub category: Option<String>,
    pub links: Option<BTreeMap<String, u32>>,
}

/// 带关联扩展的检索结果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedMemory {
    pub id: String,
    pub content: String,
    pub context: String,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub timestamp: String,
    pub category: String,
    /// 经由 links 扩展进来的条目为 true
    pub is_neighbor: bool,
    /// 直接命中的距离；扩展条目为 None
    pub distance: Option<f32>,
}

pub struct MemoryStore {
    memories: BTreeMap<String, MemoryEntry>,
    index: Box<dyn SimilarityIndex>,
    evolver: Evolver,
    stats: MemoryStats,
    evo_threshold: u64,
}

impl MemoryStore {
    pub fn new(index: Box<dyn SimilarityIndex>, evolver: Evolver, evo_threshold: u64) -> Self {
        Self {
            memories: BTreeMap::new(),
            index,
            evolver,
            stats: MemoryStats::default(),
            evo_threshold: evo_threshold.max(1),
        }
    }

    /// 按 [memory] 配置组装：嵌入 → 向量索引，进化模式 → Evolver
    pub fn from_config(
        cfg: &AppConfig,
        prompts: &PromptBook,
        client: Arc<dyn LlmClient>,
    ) -> Result<Self, HiveError> {
        let embedder = create_embedder(
            &cfg.memory.embedding_provider,
            cfg.llm.base_url.as_deref(),
            &cfg.memory.embedding_model,
            cfg.llm.api_key.as_deref(),
        );
        let evolver = Evolver::new(
            cfg.memory.evolve_mode.parse()?,
            cfg.memory.evolve_interval,
            prompts,
            &cfg.app.dataset,
            client,
        )?;
        Ok(Self::new(
            Box::new(VectorIndex::new(embedder)),
            evolver,
            cfg.memory.evo_threshold,
        ))
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    pub fn memories(&self) -> &BTreeMap<String, MemoryEntry> {
        &self.memories
    }

    /// k 近邻中距离不超过阈值的条目；每个保留的命中计一次检索
    pub fn find_related(
        &mut self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RelatedMemory>, HiveError> {
        let hits = self.index.search(query, k)?;
        let related: Vec<RelatedMemory> = hits
            .iter()
            .filter(|hit| hit.distance <= threshold)
            .map(|hit| RelatedMemory::from_metadata(&hit.metadata, hit.distance))
            .collect();
        for r in &related {
            *self.stats.retrieval_count.entry(r.id.clone()).or_insert(0) += 1;
        }
        Ok(related)
    }

    /// 写入新条目；`neighbours` 为空时不进化。返回新条目 id
    pub async fn add_entry(
        &mut self,
        draft: MemoryDraft,
        neighbours: &[RelatedMemory],
    ) -> Result<String, HiveError> {
        let content = draft.build_content();
        let mut entry = MemoryEntry::from_draft(draft, content);

        let outcome = self
            .evolver
            .evolve(&mut entry, &mut self.memories, neighbours)
            .await;

        let id = entry.id.clone();
        self.index.add(&id, &entry.content, entry.index_metadata())?;
        self.memories.insert(id.clone(), entry);
        tracing::debug!("Memory {} added ({} total)", id, self.memories.len());

        self.stats.evol_mem_count += outcome.affected;
        if outcome.evolved {
            self.stats.evol_count += 1;
            if self.stats.evol_count % self.evo_threshold == 0 {
                self.consolidate()?;
                tracing::info!("Consolidated memories after {} evolutions", self.stats.evol_count);
            }
        }
        Ok(id)
    }

    /// 全量重建索引
    pub fn consolidate(&mut self) -> Result<(), HiveError> {
        self.index.clear();
        for entry in self.memories.values() {
            self.index.add(&entry.id, &entry.content, entry.index_metadata())?;
        }
        Ok(())
    }

    pub fn read(&self, id: &str) -> Option<&MemoryEntry> {
        self.memories.get(id)
    }

    /// 改字段并立即重建该条目的索引项；条目不存在返回 false
    pub fn update(&mut self, id: &str, patch: MemoryPatch) -> Result<bool, HiveError> {
        let Some(entry) = self.memories.get_mut(id) else {
            return Ok(false);
        };
        if let Some(tags) = patch.tags {
            entry.tags = tags;
        }
        if let Some(context) = patch.context {
            entry.context = context;
        }
        if let Some(category) = patch.category {
            entry.category = category;
        }
        if let Some(links) = patch.links {
            entry.links = links;
        }
        self.index.delete(id);
        self.index.add(id, &entry.content, entry.index_metadata())?;
        Ok(true)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        if self.memories.remove(id).is_some() {
            self.index.delete(id);
            true
        } else {
            false
        }
    }

    /// k 近邻加上它们 links 指向的条目，总数截断为 k
    pub fn search_with_links(&self, query: &str, k: usize) -> Result<Vec<LinkedMemory>, HiveError> {
        if self.memories.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for hit in self.index.search(query, k)? {
            if !seen.insert(hit.id.clone()) {
                continue;
            }
            let meta = hit.metadata;
            results.push(LinkedMemory {
                id: hit.id,
                content: meta.content,
                context: meta.context,
                keywords: meta.keywords,
                tags: meta.tags,
                timestamp: meta.timestamp,
                category: meta.category,
                is_neighbor: false,
                distance: Some(hit.distance),
            });
        }

        let direct: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        let mut added = 0;
        'outer: for id in direct {
            let Some(entry) = self.memories.get(&id) else {
                continue;
            };
            for link in entry.links.keys() {
                if added >= k {
                    break 'outer;
                }
                if seen.contains(link) {
                    continue;
                }
                if let Some(neighbour) = self.memories.get(link) {
                    results.push(LinkedMemory {
                        id: neighbour.id.clone(),
                        content: neighbour.content.clone(),
                        context: neighbour.context.clone(),
                        keywords: neighbour.keywords.clone(),
                        tags: neighbour.tags.clone(),
                        timestamp: neighbour.timestamp.clone(),
                        category: neighbour.category.clone(),
                        is_neighbor: true,
                        distance: None,
                    });
                    seen.insert(link.clone());
                    added += 1;
                }
            }
        }
        results.truncate(k);
        Ok(results)
    }

    /// 用检查点内容替换当前状态并全量重建索引
    pub fn restore(
        &mut self,
        memories: BTreeMap<String, MemoryEntry>,
        stats: MemoryStats,
    ) -> Result<(), HiveError> {
        self.memories = memories;
        self.stats = stats;
        self.consolidate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HashingEmbedder, ScriptedLlmClient};
    use crate::memory::evolution::EvolveMode;

    fn store(mode: EvolveMode, client: Arc<ScriptedLlmClient>) -> MemoryStore {
        let evolver = Evolver::new(mode, 5, &PromptBook::builtin().unwrap(), "WikiTQ", client).unwrap();
        MemoryStore::new(
            Box::new(VectorIndex::new(Arc::new(HashingEmbedder::default()))),
            evolver,
            10,
        )
    }

    fn draft(id: &str, text: &str) -> MemoryDraft {
        MemoryDraft {
            question_id: id.into(),
            question_text: text.into(),
            question_type: "counting".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_then_find_counts_retrievals() {
        let mut ms = store(EvolveMode::Never, Arc::new(ScriptedLlmClient::default()));
        let d = draft("nt-1", "how many gold medals did norway win");
        let content = d.build_content();
        let id = ms.add_entry(d, &[]).await.unwrap();

        let first = ms.find_related(&content, 3, 0.3).unwrap();
        let second = ms.find_related(&content, 3, 0.3).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].id, id);
        assert_eq!(ms.stats().retrieval_count.get(&id), Some(&2));
        assert_eq!(ms.stats().evol_count, 0);
    }

    #[tokio::test]
    async fn test_no_neighbours_never_calls_llm() {
        let client = Arc::new(ScriptedLlmClient::default());
        let mut ms = store(EvolveMode::Always, client.clone());
        ms.add_entry(draft("a", "first question"), &[]).await.unwrap();
        ms.add_entry(draft("b", "second question"), &[]).await.unwrap();
        assert_eq!(client.calls(), 0);
        assert!(ms.memories().values().all(|e| e.tags_history.is_empty()));
    }

    #[tokio::test]
    async fn test_update_and_delete_sync_index() {
        let mut ms = store(EvolveMode::Never, Arc::new(ScriptedLlmClient::default()));
        let d = draft("nt-2", "which team scored most goals");
        let content = d.build_content();
        let id = ms.add_entry(d, &[]).await.unwrap();

        let patch = MemoryPatch {
            category: Some("Pinned".into()),
            ..Default::default()
        };
        assert!(ms.update(&id, patch).unwrap());
        let hits = ms.search_with_links(&content, 3).unwrap();
        assert_eq!(hits[0].category, "Pinned");
        assert!(!ms.update("missing", MemoryPatch::default()).unwrap());

        assert!(ms.delete(&id));
        assert!(ms.read(&id).is_none());
        assert!(ms.find_related(&content, 3, 1.0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_with_links_dedups_and_truncates() {
        let mut ms = store(EvolveMode::Never, Arc::new(ScriptedLlmClient::default()));
        let a = ms.add_entry(draft("a", "medal table for the olympics"), &[]).await.unwrap();
        let b = ms.add_entry(draft("b", "album release chronology"), &[]).await.unwrap();
        let mut links = BTreeMap::new();
        links.insert(b.clone(), 1);
        ms.update(&a, MemoryPatch { links: Some(links), ..Default::default() }).unwrap();

        let hits = ms.search_with_links("medal table for the olympics", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a);

        // b 已是直接命中，不会再作为邻居重复出现
        let hits = ms.search_with_links("medal table for the olympics", 3).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| !h.is_neighbor));
        assert!(hits.iter().any(|h| h.id == b));
    }
}
