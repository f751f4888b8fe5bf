//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TABLEHIVE__*` 覆盖
//! （双下划线表示嵌套，如 `TABLEHIVE__MEMORY__EVOLVE_MODE=always`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub rounds: RoundsSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
}

/// [app] 段：数据集、输入输出、角色集合
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// WikiTQ / TabFact
    pub dataset: String,
    /// 预处理好的问题 JSONL（每行含 qs_id、query、origin_table、ground_truth、column_list）
    pub input_file: PathBuf,
    /// 记录文件；存在时从中续跑
    pub output_file: PathBuf,
    /// 只处理前 head 条
    pub head: usize,
    pub start_role: String,
    /// 可用角色，支持显示名与旧常量名（REASONER_NAME 等）
    pub available_roles: Vec<String>,
    /// zero_shot / few_shot / cot
    pub baseline_variant: String,
    /// 批处理模式下的轮次状态文件
    pub round_state_file: PathBuf,
    /// 外部提示词本；未设置时用内置的 config/prompts.toml
    pub prompts_file: Option<PathBuf>,
    /// evaluate 子命令的明细输出
    pub evaluation_file: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            dataset: "WikiTQ".to_string(),
            input_file: PathBuf::from("data/questions.jsonl"),
            output_file: PathBuf::from("results/records.jsonl"),
            head: 1_000_000,
            start_role: "Solver".to_string(),
            available_roles: vec![
                "Solver".to_string(),
                "Reflector".to_string(),
                "Checker".to_string(),
            ],
            baseline_variant: "zero_shot".to_string(),
            round_state_file: PathBuf::from("results/processed_jobs.json"),
            prompts_file: None,
            evaluation_file: None,
        }
    }
}

/// [rounds] 段：各角色轮次预算与 Checker 通过分
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundsSection {
    pub max_inner_reasoner_round: u32,
    pub max_outer_reasoner_round: u32,
    pub max_checker_round: u32,
    pub max_reflector_round: u32,
    pub wiki_checker_points: i64,
    pub tab_checker_points: i64,
}

impl Default for RoundsSection {
    fn default() -> Self {
        Self {
            max_inner_reasoner_round: 5,
            max_outer_reasoner_round: 4,
            max_checker_round: 5,
            max_reflector_round: 5,
            wiki_checker_points: 6,
            tab_checker_points: 1,
        }
    }
}

/// [llm] 段：后端选择、并发与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub max_concurrency: usize,
    pub batch_job_dir: PathBuf,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            max_concurrency: crate::llm::DEFAULT_MAX_CONCURRENCY,
            batch_job_dir: PathBuf::from("oai_jobs"),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 600 }
    }
}

/// [memory] 段：检索参数、进化策略、检查点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub checkpoint_file: PathBuf,
    pub retrieve_number: usize,
    pub retrieve_distance: f32,
    /// LLM_based / always / every_n_entries / never
    pub evolve_mode: String,
    pub evolve_interval: usize,
    /// 每多少次进化做一次全量重建
    pub evo_threshold: u64,
    pub checkpoint_every: usize,
    /// 邻居数超过该值的条目不入库
    pub insert_neighbor_limit: usize,
    /// hashing / openai
    pub embedding_provider: String,
    pub embedding_model: String,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            checkpoint_file: PathBuf::from("memory/memory.json"),
            retrieve_number: 3,
            retrieve_distance: 0.3,
            evolve_mode: "LLM_based".to_string(),
            evolve_interval: 5,
            evo_threshold: 10,
            checkpoint_every: 10,
            insert_neighbor_limit: 3,
            embedding_provider: "hashing".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 TABLEHIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在）
/// 3. 最后叠加环境变量 TABLEHIVE__*
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TABLEHIVE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("app.available_roles")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
