//! tablehive - 表格问答多智能体框架
//!
//! 模块划分：
//! - **agents**: 角色状态机（Solver / Checker / Reflector / Baseline / ResultAnalyze）、记录与提示词
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 协调器、运行循环、错误类型
//! - **evaluate**: 答案归一化与准确率
//! - **llm**: LLM 客户端抽象、并发网关、批处理任务、嵌入
//! - **memory**: 记忆条目、相似度索引、演化策略、检查点与挂载
//! - **observability**: tracing 日志初始化
//! - **records**: JSONL 记录读写与批处理轮次状态

pub mod agents;
pub mod config;
pub mod core;
pub mod evaluate;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod records;
