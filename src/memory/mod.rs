//! 长期记忆：问答经验条目、相似度索引、进化策略、检查点与写入 / 挂载流水线

pub mod attach;
pub mod checkpoint;
pub mod entry;
pub mod evolution;
pub mod index;
pub mod ingest;
pub mod store;
pub mod tokenizer;

pub use attach::{attach_memories, format_memory, retrieval_query, NO_RELATED_MEMORY};
pub use checkpoint::{restore_store, CheckpointFile, MemoryCheckpoint};
pub use entry::{
    IndexMetadata, MemoryDraft, MemoryEntry, RelatedMemory, DEFAULT_CONTEXT, EVOLVE_NOTE,
    ORIGINAL_NOTE,
};
pub use evolution::{apply_evolution, EvolutionDecision, EvolutionOutcome, EvolveMode, Evolver};
pub use index::{cosine_similarity, SearchHit, SimilarityIndex, VectorIndex};
pub use ingest::{ingest_records, IngestOptions, IngestReport};
pub use store::{LinkedMemory, MemoryPatch, MemoryStats, MemoryStore};
