//! 记忆检查点：单个 JSON 对象 `{memories, resume_index, evol_count, evol_mem_count, retrieval_count}`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::memory::entry::MemoryEntry;
use crate::memory::store::{MemoryStats, MemoryStore};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCheckpoint {
    pub memories: BTreeMap<String, MemoryEntry>,
    /// 下一条待处理输入的下标
    pub resume_index: usize,
    pub evol_count: u64,
    pub evol_mem_count: u64,
    pub retrieval_count: BTreeMap<String, u64>,
}

impl MemoryCheckpoint {
    pub fn capture(store: &MemoryStore, resume_index: usize) -> Self {
        let stats = store.stats();
        Self {
            memories: store.memories().clone(),
            resume_index,
            evol_count: stats.evol_count,
            evol_mem_count: stats.evol_mem_count,
            retrieval_count: stats.retrieval_count.clone(),
        }
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            evol_count: self.evol_count,
            evol_mem_count: self.evol_mem_count,
            retrieval_count: self.retrieval_count.clone(),
        }
    }
}

/// 文件检查点
#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在时返回 None
    pub fn load(&self) -> anyhow::Result<Option<MemoryCheckpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading memory checkpoint {}", self.path.display()))?;
        let checkpoint = serde_json::from_str(&data)
            .with_context(|| format!("parsing memory checkpoint {}", self.path.display()))?;
        Ok(Some(checkpoint))
    }

    /// 先写临时文件再改名；父目录不存在时自动创建
    pub fn save(&self, checkpoint: &MemoryCheckpoint) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(checkpoint)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// 读取检查点并恢复到 store；返回续跑下标（无检查点为 0）
pub fn restore_store(store: &mut MemoryStore, file: &CheckpointFile) -> anyhow::Result<usize> {
    let Some(checkpoint) = file.load()? else {
        return Ok(0);
    };
    let resume_index = checkpoint.resume_index;
    let stats = checkpoint.stats();
    let count = checkpoint.memories.len();
    store.restore(checkpoint.memories, stats)?;
    tracing::info!(
        "Resumed {} memories from {} (resume index {})",
        count,
        file.path().display(),
        resume_index
    );
    Ok(resume_index)
}
