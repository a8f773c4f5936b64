//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预置回复，并记录收到的 prompt，便于断言纠错重试路径。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;

/// 脚本化客户端：每次 complete 弹出下一条预置回复
#[derive(Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 收到过的 user prompt（按序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(user.to_string());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| "mock script exhausted".to_string())
    }
}
