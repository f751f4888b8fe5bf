//! 运行上下文：数据集、轮次预算、可用角色与提示词本
//!
//! 构造时完成全部配置校验，未知角色 / 数据集、起始角色不可用、缺少提示词等都在这里报错。

use std::fmt;
use std::str::FromStr;

use crate::agents::prompts::{baseline_key, PromptBook, PromptTemplate};
use crate::agents::record::RoleName;
use crate::config::{AppConfig, RoundsSection};
use crate::core::HiveError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dataset {
    WikiTq,
    TabFact,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::WikiTq => "WikiTQ",
            Dataset::TabFact => "TabFact",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "WikiTQ" => Ok(Dataset::WikiTq),
            "TabFact" => Ok(Dataset::TabFact),
            other => Err(HiveError::UnknownDataset(other.to_string())),
        }
    }
}

/// 轮次预算与 Checker 通过分
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundLimits {
    pub max_inner: u32,
    pub max_outer: u32,
    pub max_checker: u32,
    pub max_reflector: u32,
    pub wiki_checker_points: i64,
    pub tab_checker_points: i64,
}

impl Default for RoundLimits {
    fn default() -> Self {
        Self::from(&RoundsSection::default())
    }
}

impl From<&RoundsSection> for RoundLimits {
    fn from(r: &RoundsSection) -> Self {
        Self {
            max_inner: r.max_inner_reasoner_round,
            max_outer: r.max_outer_reasoner_round,
            max_checker: r.max_checker_round,
            max_reflector: r.max_reflector_round,
            wiki_checker_points: r.wiki_checker_points,
            tab_checker_points: r.tab_checker_points,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunContext {
    pub dataset: Dataset,
    pub limits: RoundLimits,
    pub available: Vec<RoleName>,
    pub start_role: RoleName,
    pub baseline_variant: String,
    pub prompts: PromptBook,
}

impl RunContext {
    pub fn new(
        dataset: Dataset,
        limits: RoundLimits,
        available: Vec<RoleName>,
        start_role: RoleName,
        baseline_variant: impl Into<String>,
        prompts: PromptBook,
    ) -> Result<Self, HiveError> {
        let ctx = Self {
            dataset,
            limits,
            available,
            start_role,
            baseline_variant: baseline_variant.into(),
            prompts,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, HiveError> {
        let dataset = cfg.app.dataset.parse()?;
        let available = parse_roles(&cfg.app.available_roles)?;
        let start_role = cfg.app.start_role.parse()?;
        let prompts = PromptBook::load(cfg.app.prompts_file.as_deref())?;
        Self::new(
            dataset,
            RoundLimits::from(&cfg.rounds),
            available,
            start_role,
            cfg.app.baseline_variant.clone(),
            prompts,
        )
    }

    fn validate(&self) -> Result<(), HiveError> {
        if !self.is_available(self.start_role) {
            return Err(HiveError::RoleUnavailable(self.start_role.to_string()));
        }
        let needs_solver =
            self.is_available(RoleName::Checker) || self.is_available(RoleName::Reflector);
        if needs_solver && !self.is_available(RoleName::Solver) {
            return Err(HiveError::Config(
                "Checker / Reflector need Solver in the available role set".to_string(),
            ));
        }
        for role in &self.available {
            self.prompt_for(*role)?;
        }
        Ok(())
    }

    pub fn is_available(&self, role: RoleName) -> bool {
        self.available.contains(&role)
    }

    /// 当前数据集的 Checker 通过分
    pub fn checker_points(&self) -> i64 {
        match self.dataset {
            Dataset::WikiTq => self.limits.wiki_checker_points,
            Dataset::TabFact => self.limits.tab_checker_points,
        }
    }

    pub fn prompt_for(&self, role: RoleName) -> Result<&PromptTemplate, HiveError> {
        let key = match role {
            RoleName::Baseline => baseline_key(&self.baseline_variant),
            other => other.as_str().to_string(),
        };
        self.prompts.get(self.dataset.as_str(), &key)
    }
}

/// 解析角色列表；逗号分隔的单个字符串也可以
pub fn parse_roles(names: &[String]) -> Result<Vec<RoleName>, HiveError> {
    let mut roles = Vec::new();
    for name in names.iter().flat_map(|n| n.split(',')) {
        if name.trim().is_empty() {
            continue;
        }
        let role: RoleName = name.parse()?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(available: &[RoleName], start: RoleName) -> Result<RunContext, HiveError> {
        RunContext::new(
            Dataset::WikiTq,
            RoundLimits::default(),
            available.to_vec(),
            start,
            "zero_shot",
            PromptBook::builtin()?,
        )
    }

    #[test]
    fn test_start_role_must_be_available() {
        let err = ctx(&[RoleName::Solver], RoleName::Baseline).unwrap_err();
        assert!(matches!(err, HiveError::RoleUnavailable(_)));
    }

    #[test]
    fn test_checker_requires_solver() {
        let err = ctx(&[RoleName::Checker], RoleName::Checker).unwrap_err();
        assert!(matches!(err, HiveError::Config(_)));
    }

    #[test]
    fn test_parse_roles_mixed_names() {
        let roles = parse_roles(&["REASONER_NAME,CHECKER_NAME".into(), "Reflector".into()]).unwrap();
        assert_eq!(roles, vec![RoleName::Solver, RoleName::Checker, RoleName::Reflector]);
        assert!(parse_roles(&["Solver,Oracle".into()]).is_err());
    }

    #[test]
    fn test_unknown_baseline_variant_is_rejected() {
        let err = RunContext::new(
            Dataset::TabFact,
            RoundLimits::default(),
            vec![RoleName::Baseline],
            RoleName::Baseline,
            "tree_of_thought",
            PromptBook::builtin().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, HiveError::MissingPrompt { .. }));
    }

    #[test]
    fn test_checker_points_follow_dataset() {
        let c = ctx(&[RoleName::Solver], RoleName::Solver).unwrap();
        assert_eq!(c.checker_points(), 6);
        assert_eq!("TabFact".parse::<Dataset>().unwrap(), Dataset::TabFact);
        assert!("Spider".parse::<Dataset>().is_err());
    }
}
