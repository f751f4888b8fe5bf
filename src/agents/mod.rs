//! 角色状态机：Solver / Checker / Reflector / Baseline / ResultAnalyze
//!
//! 每个角色实现同一能力集：
//! - `prepare_prompt`：只读记录，生成 (system, user) 提示词
//! - `process_response`：解析回复、追加结果历史、更新计数器，并且**总是**设置 `send_to`
//!
//! 回复为 None（网关调用失败）时按格式错误处理。角色到实现的映射是全函数 `agent_for`。

pub mod baseline;
pub mod checker;
pub mod context;
pub mod parser;
pub mod prompts;
pub mod record;
pub mod reflector;
pub mod result_analyze;
pub mod solver;

pub use baseline::BaselineAgent;
pub use checker::CheckerAgent;
pub use context::{parse_roles, Dataset, RoundLimits, RunContext};
pub use parser::{normalize_bool, parse_baseline_answer, parse_json, ParseError};
pub use prompts::{PromptBook, PromptTemplate};
pub use record::{
    BaselineOutcome, CheckerOutcome, InnerAttempt, MessageRecord, OuterRound, ReflectorOutcome,
    RoleName, SendTo, END_NAME,
};
pub use reflector::ReflectorAgent;
pub use result_analyze::ResultAnalyzeAgent;
pub use solver::SolverAgent;

use serde_json::{Map, Value};

use crate::core::HiveError;
use crate::llm::PromptPair;

/// 答案未就绪标记（从答案中移除）
pub const NOT_READY: &str = "<NOT_READY>";
/// 表格未改动标记（保留 current_table）
pub const NOT_CHANGED: &str = "<NOT_CHANGED>";
/// 格式错误时写入的答案
pub const INVALID_FORMAT: &str = "INVALID_FORMAT";

pub trait Agent: Send + Sync {
    fn role(&self) -> RoleName;

    fn prepare_prompt(&self, record: &MessageRecord, ctx: &RunContext) -> Result<PromptPair, HiveError>;

    fn process_response(&self, record: &mut MessageRecord, response: Option<&str>, ctx: &RunContext);
}

/// 角色 → 实现
pub fn agent_for(role: RoleName) -> &'static dyn Agent {
    match role {
        RoleName::Solver => &SolverAgent,
        RoleName::Checker => &CheckerAgent,
        RoleName::Reflector => &ReflectorAgent,
        RoleName::Baseline => &BaselineAgent,
        RoleName::ResultAnalyze => &ResultAnalyzeAgent,
    }
}

/// 解析可能缺失的回复
pub(crate) fn parse_response(response: Option<&str>) -> Result<Map<String, Value>, ParseError> {
    response.map_or(Err(ParseError::Empty), parse_json)
}

/// 结构化值在提示词中的文本形式
pub(crate) fn render_value<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
