//! TaskHandler：按动作类别选择执行路径
//!
//! 专化 Agent（RAG / Code / Research）不靠子类继承覆盖执行逻辑，
//! 而是向注册表按动作前缀挂接 handler；默认路径是工具调用。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::execute::ToolExecutor;
use crate::ontology::{Identity, Task, TaskResult};

/// 一类任务的执行入口
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, identity: &Identity, task: &Task) -> Result<TaskResult, AgentError>;
}

/// 默认 handler：经 ToolExecutor 走工具调用
pub struct ToolCallHandler {
    executor: Arc<ToolExecutor>,
}

impl ToolCallHandler {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl TaskHandler for ToolCallHandler {
    async fn handle(&self, identity: &Identity, task: &Task) -> Result<TaskResult, AgentError> {
        self.executor.execute(identity, task).await
    }
}

/// 动作前缀 -> handler 的注册表；未命中前缀走默认 handler
pub struct HandlerRegistry {
    by_prefix: Vec<(String, Arc<dyn TaskHandler>)>,
    default: Arc<dyn TaskHandler>,
}

impl HandlerRegistry {
    pub fn new(default: Arc<dyn TaskHandler>) -> Self {
        Self {
            by_prefix: Vec::new(),
            default,
        }
    }

    /// 注册一个动作前缀的专化 handler（先注册者优先）
    pub fn register(&mut self, action_prefix: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.by_prefix.push((action_prefix.into(), handler));
    }

    pub fn resolve(&self, action: &str) -> Arc<dyn TaskHandler> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| action.starts_with(prefix.as_str()))
            .map(|(_, h)| h.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}
