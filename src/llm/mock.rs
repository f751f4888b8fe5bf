//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - `MockLlmClient`：固定返回一个「答案未就绪」的 Solver JSON，离线跑通整个轮次状态机直到预算耗尽
//! - `ScriptedLlmClient`：按顺序弹出预设回复，记录收到的提示词，供单元测试断言

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

/// Mock 客户端：不理会输入，返回一个合法但未给出答案的 Solver 回复
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Ok(r#"{"thought": "mock", "action": "", "intermediate_table": "<NOT_CHANGED>", "answer": "<NOT_READY>"}"#
            .to_string())
    }
}

/// 脚本化客户端：每次调用弹出队首回复；队列耗尽后返回 EmptyResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|s| Ok(s.into())).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条回复
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    /// 追加一次调用失败
    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(reason.into()));
        }
    }

    /// 已收到的调用次数
    pub fn calls(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// 最近一次调用的消息
    pub fn last_messages(&self) -> Option<Vec<Message>> {
        self.seen.lock().ok().and_then(|s| s.last().cloned())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| LlmError::ApiError(e.to_string()))?
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(LlmError::ApiError(reason)),
            None => Err(LlmError::EmptyResponse),
        }
    }
}
