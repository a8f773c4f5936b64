//! 任务实体、分解记录与终态快照

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// 等待依赖
    Pending,
    /// 依赖已满足，可派发
    Ready,
    /// 正在执行
    Running,
    /// 成功（终态）
    Succeeded,
    /// 失败（终态）
    Failed,
    /// 被跳过（可选任务耗尽重试，或目标取消；终态）
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// 作为依赖是否算已满足
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

/// 任务：恰好映射到一次工具调用的原子工作单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub goal_id: String,
    pub action: String,
    pub description: String,
    pub parameters: serde_json::Value,
    /// 前置任务 id（必须已属于同一目标，构成 DAG）
    pub dependencies: Vec<String>,
    /// 工具消歧 hint：服务器名或 "server/tool"
    pub required_tool_hints: Vec<String>,
    /// 可选任务失败耗尽预算后 Skipped 而非拖垮目标
    pub optional: bool,
    pub status: TaskStatus,
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub error_messages: Vec<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Task {
    pub fn new(goal_id: &str, action: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            task_id: format!("task_{}", uuid::Uuid::new_v4()),
            goal_id: goal_id.to_string(),
            action: action.into(),
            description: String::new(),
            parameters,
            dependencies: Vec::new(),
            required_tool_hints: Vec::new(),
            optional: false,
            status: TaskStatus::Pending,
            attempts: 0,
            result: None,
            error_messages: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_hints(mut self, hints: Vec<String>) -> Self {
        self.required_tool_hints = hints;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// LLM 分解输出中的单条任务记录（结构化输出契约的一部分）
///
/// `depends_on` 为列表内的零基序号，只能引用更早的条目。
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskSpec {
    /// 简洁的动词短语，同时是工具名
    pub action: String,
    /// 足够让另一个 Agent 理解并执行的细节
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub optional: bool,
}

/// 任务终态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub action: String,
    pub status: TaskStatus,
    pub payload: Option<serde_json::Value>,
    /// 使用的工具（"server/tool"），策略拒绝等未触达工具时为 None
    pub tool_used: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}
