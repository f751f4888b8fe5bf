//! 记忆写入流水线：把分析过的记录逐条写入记忆库，定期保存检查点，可断点续跑

use crate::agents::MessageRecord;
use crate::config::MemorySection;
use crate::memory::checkpoint::{restore_store, CheckpointFile, MemoryCheckpoint};
use crate::memory::entry::MemoryDraft;
use crate::memory::store::MemoryStore;

#[derive(Clone, Debug, PartialEq)]
pub struct IngestOptions {
    pub retrieve_number: usize,
    pub retrieve_distance: f32,
    /// 近邻数超过该值的记录不入库
    pub insert_neighbor_limit: usize,
    pub checkpoint_every: usize,
}

impl From<&MemorySection> for IngestOptions {
    fn from(m: &MemorySection) -> Self {
        Self {
            retrieve_number: m.retrieve_number,
            retrieve_distance: m.retrieve_distance,
            insert_neighbor_limit: m.insert_neighbor_limit,
            checkpoint_every: m.checkpoint_every.max(1),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub resumed_from: usize,
    pub processed: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// 从检查点的 resume_index 开始处理 `records`
pub async fn ingest_records(
    store: &mut MemoryStore,
    records: &[MessageRecord],
    checkpoint: &CheckpointFile,
    opts: &IngestOptions,
) -> anyhow::Result<IngestReport> {
    let resumed_from = restore_store(store, checkpoint)?;
    let mut report = IngestReport {
        resumed_from,
        ..Default::default()
    };
    let every = opts.checkpoint_every.max(1);

    for (idx, record) in records.iter().enumerate().skip(resumed_from) {
        let draft = MemoryDraft::from_record(record);
        let content = draft.build_content();
        let neighbours =
            store.find_related(&content, opts.retrieve_number, opts.retrieve_distance)?;

        if neighbours.len() <= opts.insert_neighbor_limit {
            store.add_entry(draft, &neighbours).await?;
            report.inserted += 1;
        } else {
            tracing::debug!(
                "Skipping {}: {} neighbours within distance",
                record.qs_id,
                neighbours.len()
            );
            report.skipped += 1;
        }
        report.processed += 1;

        if (idx + 1) % every == 0 || idx + 1 == records.len() {
            checkpoint.save(&MemoryCheckpoint::capture(store, idx + 1))?;
            tracing::info!("Checkpoint saved: {} memories at step {}", store.len(), idx + 1);
        }
    }

    let stats = store.stats();
    tracing::info!(
        "Memorize finished: {} memories, {} evolutions involving {} memories",
        store.len(),
        stats.evol_count,
        stats.evol_mem_count
    );
    Ok(report)
}
