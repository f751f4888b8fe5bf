//! 消息记录：每个问题一条，在各角色之间流转
//!
//! 所有字段预先声明并带默认值；数据集里的其他列原样保存在 `extras` 中。
//! 持久化格式为 JSONL，字段名为 snake_case。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::HiveError;

/// 角色（封闭枚举）；序列化为显示名，兼容旧常量名
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleName {
    Solver,
    Checker,
    Reflector,
    Baseline,
    ResultAnalyze,
}

impl RoleName {
    pub const ALL: [RoleName; 5] = [
        RoleName::Solver,
        RoleName::Checker,
        RoleName::Reflector,
        RoleName::Baseline,
        RoleName::ResultAnalyze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Solver => "Solver",
            RoleName::Checker => "Checker",
            RoleName::Reflector => "Reflector",
            RoleName::Baseline => "Baseline",
            RoleName::ResultAnalyze => "Result_Analyze",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Solver" | "REASONER_NAME" => Ok(RoleName::Solver),
            "Checker" | "CHECKER_NAME" => Ok(RoleName::Checker),
            "Reflector" | "REFLECTOR_NAME" => Ok(RoleName::Reflector),
            "Baseline" | "BASELINE_NAME" => Ok(RoleName::Baseline),
            "Result_Analyze" | "RA_NAME" => Ok(RoleName::ResultAnalyze),
            other => Err(HiveError::UnknownRole(other.to_string())),
        }
    }
}

pub const END_NAME: &str = "End";

/// 下一站：某个角色或终止
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SendTo {
    Role(RoleName),
    End,
}

impl SendTo {
    pub fn is_end(&self) -> bool {
        matches!(self, SendTo::End)
    }

    pub fn role(&self) -> Option<RoleName> {
        match self {
            SendTo::Role(r) => Some(*r),
            SendTo::End => None,
        }
    }
}

impl Default for SendTo {
    fn default() -> Self {
        SendTo::Role(RoleName::Solver)
    }
}

impl fmt::Display for SendTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendTo::Role(r) => f.write_str(r.as_str()),
            SendTo::End => f.write_str(END_NAME),
        }
    }
}

impl TryFrom<String> for SendTo {
    type Error = HiveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.trim() == END_NAME {
            Ok(SendTo::End)
        } else {
            s.parse().map(SendTo::Role)
        }
    }
}

impl From<SendTo> for String {
    fn from(s: SendTo) -> Self {
        s.to_string()
    }
}

impl From<RoleName> for SendTo {
    fn from(r: RoleName) -> Self {
        SendTo::Role(r)
    }
}

/// Solver 的一次内层尝试
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InnerAttempt {
    pub inner_round: u32,
    #[serde(deserialize_with = "lenient_string")]
    pub thought: String,
    /// 字符串或对象（对象在动作历史中展开为 k=v）
    pub action: Value,
    #[serde(deserialize_with = "lenient_string")]
    pub intermediate_table: String,
    #[serde(deserialize_with = "lenient_string")]
    pub answer: String,
    pub llm_response: Option<String>,
}

/// 一个外层轮次及其内层尝试
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OuterRound {
    pub outer_round: u32,
    pub inner_result_list: Vec<InnerAttempt>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerOutcome {
    pub round: u32,
    /// 解析成功时为 feedback 对象，失败时为原始回复
    pub feedback: Value,
    pub checker_score: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectorOutcome {
    pub round: u32,
    pub diagnosis: Value,
    pub improvement_plan: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineOutcome {
    pub round: u32,
    pub answer: String,
}

/// 消息记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub qs_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub query: String,
    #[serde(deserialize_with = "lenient_string")]
    pub origin_table: String,
    #[serde(deserialize_with = "lenient_string")]
    pub current_table: String,
    #[serde(deserialize_with = "lenient_string")]
    pub ground_truth: String,
    #[serde(deserialize_with = "lenient_list")]
    pub column_list: Vec<String>,

    pub send_to: SendTo,
    pub first_round_in_loop: bool,

    pub outer_reasoner_round: u32,
    pub inner_reasoner_round: u32,
    pub checker_round: u32,
    pub reflector_round: u32,
    pub baseline_round: u32,
    pub total_round: u32,

    pub reasoner_result: Vec<OuterRound>,
    pub checker_result: Vec<CheckerOutcome>,
    pub reflector_result: Vec<ReflectorOutcome>,
    pub baseline_result: Vec<BaselineOutcome>,

    #[serde(deserialize_with = "lenient_string")]
    pub answer: String,

    #[serde(deserialize_with = "lenient_string")]
    pub retrieved_memory: String,
    pub memory_distance: Option<f32>,

    // ResultAnalyze 写入的分析字段
    #[serde(deserialize_with = "lenient_string")]
    pub question_type: String,
    #[serde(deserialize_with = "lenient_list")]
    pub required_operations: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub context: String,
    #[serde(deserialize_with = "lenient_list")]
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub correct_steps: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub wrong_steps: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub error_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub error_reason: String,

    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl Default for MessageRecord {
    fn default() -> Self {
        Self {
            qs_id: String::new(),
            query: String::new(),
            origin_table: String::new(),
            current_table: String::new(),
            ground_truth: String::new(),
            column_list: Vec::new(),
            send_to: SendTo::default(),
            first_round_in_loop: true,
            outer_reasoner_round: 0,
            inner_reasoner_round: 0,
            checker_round: 0,
            reflector_round: 0,
            baseline_round: 0,
            total_round: 0,
            reasoner_result: Vec::new(),
            checker_result: Vec::new(),
            reflector_result: Vec::new(),
            baseline_result: Vec::new(),
            answer: String::new(),
            retrieved_memory: String::new(),
            memory_distance: None,
            question_type: String::new(),
            required_operations: Vec::new(),
            context: String::new(),
            keywords: Vec::new(),
            tags: Vec::new(),
            correct_steps: Vec::new(),
            wrong_steps: Vec::new(),
            error_type: String::new(),
            error_reason: String::new(),
            extras: Map::new(),
        }
    }
}

impl MessageRecord {
    pub fn new(
        qs_id: impl Into<String>,
        query: impl Into<String>,
        origin_table: impl Into<String>,
        start: RoleName,
    ) -> Self {
        Self {
            qs_id: qs_id.into(),
            query: query.into(),
            origin_table: origin_table.into(),
            send_to: SendTo::Role(start),
            ..Default::default()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.send_to.is_end()
    }

    /// 开启新的外层轮次：下一站 Solver，内层计数清零
    pub fn start_new_outer_round(&mut self) {
        self.send_to = SendTo::Role(RoleName::Solver);
        self.first_round_in_loop = true;
        self.inner_reasoner_round = 0;
    }

    /// 清空轮次计数与各角色结果，从 `start` 角色重新开始；输入字段、挂载的记忆与分析字段保留
    pub fn reset_progress(&mut self, start: RoleName) {
        self.send_to = SendTo::Role(start);
        self.first_round_in_loop = true;
        self.current_table.clear();
        self.answer.clear();
        self.outer_reasoner_round = 0;
        self.inner_reasoner_round = 0;
        self.checker_round = 0;
        self.reflector_round = 0;
        self.baseline_round = 0;
        self.total_round = 0;
        self.reasoner_result.clear();
        self.checker_result.clear();
        self.reflector_result.clear();
        self.baseline_result.clear();
    }

    /// 外层预算未耗尽则开启新外层轮次，否则终止
    pub fn restart_or_end(&mut self, max_outer: u32) {
        if self.outer_reasoner_round < max_outer {
            self.start_new_outer_round();
        } else {
            self.send_to = SendTo::End;
        }
    }

    /// 当前外层轮次（Solver 已开启的最后一个桶）
    pub fn current_bucket(&self) -> Option<&OuterRound> {
        let idx = (self.outer_reasoner_round as usize).checked_sub(1)?;
        self.reasoner_result.get(idx)
    }

    /// 当前外层轮次的可变引用；桶缺失（手工改过的记录）时补齐
    pub fn current_bucket_mut(&mut self) -> &mut OuterRound {
        let outer = self.outer_reasoner_round.max(1);
        self.outer_reasoner_round = outer;
        while self.reasoner_result.len() < outer as usize {
            let n = self.reasoner_result.len() as u32 + 1;
            self.reasoner_result.push(OuterRound {
                outer_round: n,
                inner_result_list: Vec::new(),
            });
        }
        &mut self.reasoner_result[outer as usize - 1]
    }
}

/// 任意 JSON 值转为文本：字符串原样，null 为空，其余用 JSON 表示
pub fn value_to_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 任意 JSON 值转为字符串列表：数组逐项转换，单个非空值作为单元素列表
pub fn value_to_list(v: &Value) -> Vec<String> {
    match v {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![value_to_text(other)],
    }
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(&Value::deserialize(deserializer)?))
}

pub(crate) fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_list(&Value::deserialize(deserializer)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_accept_legacy_constants() {
        assert_eq!("REASONER_NAME".parse::<RoleName>().unwrap(), RoleName::Solver);
        assert_eq!("RA_NAME".parse::<RoleName>().unwrap(), RoleName::ResultAnalyze);
        assert_eq!("Result_Analyze".parse::<RoleName>().unwrap(), RoleName::ResultAnalyze);
        assert!(matches!(
            "Planner".parse::<RoleName>(),
            Err(HiveError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_send_to_serializes_as_name() {
        let rec = MessageRecord::new("nt-1", "q", "|a|", RoleName::Checker);
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["send_to"], "Checker");
        let mut done = rec.clone();
        done.send_to = SendTo::End;
        assert_eq!(serde_json::to_value(&done).unwrap()["send_to"], "End");
    }

    #[test]
    fn test_unknown_dataset_columns_are_kept() {
        let line = r#"{"qs_id": 7, "query": "q", "origin_table": "t", "ground_truth": true,
                       "column_list": ["a", "b"], "send_to": "Solver", "source": "dev"}"#;
        let rec: MessageRecord = serde_json::from_str(line).unwrap();
        assert_eq!(rec.qs_id, "7");
        assert_eq!(rec.ground_truth, "true");
        assert!(rec.first_round_in_loop);
        assert_eq!(rec.extras.get("source"), Some(&Value::from("dev")));
        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back["source"], "dev");
    }

    #[test]
    fn test_restart_or_end() {
        let mut rec = MessageRecord::default();
        rec.outer_reasoner_round = 2;
        rec.inner_reasoner_round = 5;
        rec.first_round_in_loop = false;
        rec.restart_or_end(4);
        assert_eq!(rec.send_to, SendTo::Role(RoleName::Solver));
        assert!(rec.first_round_in_loop);
        assert_eq!(rec.inner_reasoner_round, 0);

        rec.outer_reasoner_round = 4;
        rec.restart_or_end(4);
        assert!(rec.is_finished());
    }
}
