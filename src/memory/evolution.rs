//! 记忆进化：新条目入库前，由 LLM 决定是否与近邻建立关联、改写近邻的标签与上下文
//!
//! 决策载荷 `{should_evolve, actions[], suggested_connections[], tags_to_update[],
//! new_context_neighborhood[], new_tags_neighborhood[]}`；动作按出现顺序依次生效。
//! `suggested_connections` 与两个邻域列表按下标配对，列表较短时缺位的字段不改。

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::agents::parser::parse_json;
use crate::agents::prompts::{PromptBook, PromptTemplate, EVOLVE_ALWAYS_KEY, EVOLVE_OPTIONAL_KEY};
use crate::agents::record::value_to_list;
use crate::agents::{normalize_bool, render_value};
use crate::core::HiveError;
use crate::llm::LlmClient;
use crate::memory::entry::{MemoryEntry, RelatedMemory, EVOLVE_NOTE};

const ACTION_STRENGTHEN: &str = "strengthen";
const ACTION_UPDATE_NEIGHBOR: &str = "update_neighbor";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvolveMode {
    /// 由 LLM 决定是否进化，不记录标签 / 上下文历史
    LlmBased,
    /// 总是请求进化，覆盖前记录历史
    Always,
    /// 与 Always 相同，但只在 `len(memories) % interval == 0` 时触发
    EveryNEntries,
    Never,
}

impl EvolveMode {
    pub fn keeps_history(&self) -> bool {
        matches!(self, EvolveMode::Always | EvolveMode::EveryNEntries)
    }

    fn prompt_key(&self) -> Option<&'static str> {
        match self {
            EvolveMode::LlmBased => Some(EVOLVE_OPTIONAL_KEY),
            EvolveMode::Always | EvolveMode::EveryNEntries => Some(EVOLVE_ALWAYS_KEY),
            EvolveMode::Never => None,
        }
    }
}

impl FromStr for EvolveMode {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "LLM_based" => Ok(EvolveMode::LlmBased),
            "always" => Ok(EvolveMode::Always),
            "every_n_entries" => Ok(EvolveMode::EveryNEntries),
            "never" => Ok(EvolveMode::Never),
            other => Err(HiveError::UnknownEvolveMode(other.to_string())),
        }
    }
}

/// 解析后的进化决策
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvolutionDecision {
    pub should_evolve: bool,
    pub actions: Vec<String>,
    pub suggested_connections: Vec<String>,
    pub tags_to_update: Vec<String>,
    pub new_context_neighborhood: Vec<String>,
    pub new_tags_neighborhood: Vec<Vec<String>>,
}

impl EvolutionDecision {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let list = |key: &str| map.get(key).map(value_to_list).unwrap_or_default();
        Self {
            should_evolve: map.get("should_evolve").map(normalize_bool).unwrap_or(false),
            actions: list("actions"),
            suggested_connections: list("suggested_connections"),
            tags_to_update: list("tags_to_update"),
            new_context_neighborhood: list("new_context_neighborhood"),
            new_tags_neighborhood: match map.get("new_tags_neighborhood") {
                Some(Value::Array(items)) => items.iter().map(value_to_list).collect(),
                _ => Vec::new(),
            },
        }
    }
}

/// 一次进化的结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvolutionOutcome {
    pub evolved: bool,
    /// 受影响条目数；多个动作时以最后一个为准
    pub affected: u64,
}

/// 把 LLM 回复作用到新条目与已有条目上（纯函数，不做 I/O）
pub fn apply_evolution(
    entry: &mut MemoryEntry,
    memories: &mut BTreeMap<String, MemoryEntry>,
    distances: &[f32],
    response: Option<&str>,
    keep_history: bool,
) -> EvolutionOutcome {
    let map = match response.map(parse_json) {
        Some(Ok(map)) => map,
        _ => {
            tracing::debug!("Evolution response unparseable, entry {} not evolved", entry.id);
            entry
                .evolution_history
                .push(response.map_or(Value::Null, |r| Value::String(r.to_string())));
            return EvolutionOutcome::default();
        }
    };

    let decision = EvolutionDecision::from_map(&map);
    entry.evolution_history.push(Value::Object(map));
    if !decision.should_evolve {
        return EvolutionOutcome::default();
    }

    let mut affected = 0;
    for action in &decision.actions {
        match action.as_str() {
            ACTION_STRENGTHEN => {
                affected = 1;
                for id in &decision.suggested_connections {
                    *entry.links.entry(id.clone()).or_insert(0) += 1;
                }
                if keep_history {
                    entry.tags_history.push(entry.tags.clone());
                }
                entry.tags = decision.tags_to_update.clone();
                entry.strengthen_distance.push(distances.to_vec());
            }
            ACTION_UPDATE_NEIGHBOR => {
                affected = decision.suggested_connections.len() as u64;
                entry.category = EVOLVE_NOTE.to_string();
                entry.update_neighbour_distance.push(distances.to_vec());
                for (i, id) in decision.suggested_connections.iter().enumerate() {
                    let Some(neighbour) = memories.get_mut(id) else {
                        continue;
                    };
                    neighbour.category = EVOLVE_NOTE.to_string();
                    if let Some(tags) = decision.new_tags_neighborhood.get(i) {
                        if keep_history {
                            neighbour.tags_history.push(neighbour.tags.clone());
                        }
                        neighbour.tags = tags.clone();
                    }
                    if let Some(context) = decision.new_context_neighborhood.get(i) {
                        if keep_history {
                            neighbour.context_history.push(neighbour.context.clone());
                        }
                        neighbour.context = context.clone();
                    }
                }
            }
            other => tracing::debug!("Ignoring unknown evolution action {}", other),
        }
    }
    EvolutionOutcome {
        evolved: true,
        affected,
    }
}

/// 进化策略：模式 + 提示词 + LLM
pub struct Evolver {
    mode: EvolveMode,
    interval: usize,
    template: Option<PromptTemplate>,
    client: Arc<dyn LlmClient>,
}

impl Evolver {
    /// 非 never 模式下提示词缺失即报错
    pub fn new(
        mode: EvolveMode,
        interval: usize,
        prompts: &PromptBook,
        dataset: &str,
        client: Arc<dyn LlmClient>,
    ) -> Result<Self, HiveError> {
        let template = match mode.prompt_key() {
            Some(key) => Some(prompts.get(dataset, key)?.clone()),
            None => None,
        };
        Ok(Self {
            mode,
            interval: interval.max(1),
            template,
            client,
        })
    }

    fn should_run(&self, memories_len: usize) -> bool {
        match self.mode {
            EvolveMode::Never => false,
            EvolveMode::LlmBased | EvolveMode::Always => true,
            EvolveMode::EveryNEntries => memories_len % self.interval == 0,
        }
    }

    /// 按模式对新条目执行一次进化；没有候选邻居或库为空时什么都不做
    pub async fn evolve(
        &self,
        entry: &mut MemoryEntry,
        memories: &mut BTreeMap<String, MemoryEntry>,
        related: &[RelatedMemory],
    ) -> EvolutionOutcome {
        if related.is_empty() || memories.is_empty() || !self.should_run(memories.len()) {
            return EvolutionOutcome::default();
        }
        let Some(template) = &self.template else {
            return EvolutionOutcome::default();
        };

        let prompt = template.render(&[
            ("content", entry.content.clone()),
            ("nearest_neighbors_memories", render_value(&related)),
            ("neighbor_number", related.len().to_string()),
        ]);
        let response = match self.client.complete_pair(&prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("Evolution request for {} failed: {}", entry.id, e);
                None
            }
        };

        let distances: Vec<f32> = related.iter().map(|r| r.distance).collect();
        let outcome = apply_evolution(
            entry,
            memories,
            &distances,
            response.as_deref(),
            self.mode.keeps_history(),
        );
        if outcome.evolved {
            tracing::info!(
                "Entry {} evolved ({} memories affected)",
                entry.id,
                outcome.affected
            );
        }
        outcome
    }
}
