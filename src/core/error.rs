//! Agent 错误类型
//!
//! 按失败层次划分：传输层（Connection / NotConnected / ToolExecution）、
//! 本体层（Validation / CyclicDependency / InvalidTransition）、
//! 执行层（SchemaValidation / NoCapableTool / AmbiguousTool / PermissionDenied）、
//! 分解层（Decomposition），以及 Config / Llm 等基础设施错误。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 连接 / 握手失败（携带服务器名与底层原因）
    #[error("Connection to server '{server}' failed: {cause}")]
    Connection { server: String, cause: String },

    #[error("Not connected to server: {0}")]
    NotConnected(String),

    /// 远端工具调用失败（含超时）
    #[error("Tool execution failed on '{server}/{tool}': {cause}")]
    ToolExecution {
        server: String,
        tool: String,
        cause: String,
    },

    /// 结构性校验失败（未知 goal、跨 goal 依赖引用等）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 任务依赖图出现环
    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    /// 非法状态迁移（终态回退、依赖未满足时进入 Running 等）
    #[error("Invalid transition for task {task_id}: {from:?} -> {to:?} ({reason})")]
    InvalidTransition {
        task_id: String,
        from: crate::ontology::TaskStatus,
        to: crate::ontology::TaskStatus,
        reason: String,
    },

    /// 参数与工具 input_schema 不符
    #[error("Schema validation failed for tool '{tool}': {cause}")]
    SchemaValidation { tool: String, cause: String },

    #[error("No capable tool for action: {0}")]
    NoCapableTool(String),

    /// 多个候选工具且无 hint 可收敛到一个
    #[error("Ambiguous tool for action '{action}': candidates {candidates:?}")]
    AmbiguousTool {
        action: String,
        candidates: Vec<String>,
    },

    #[error("Permission denied for action: {0}")]
    PermissionDenied(String),

    /// 目标分解失败（纠错重试后仍不可解析、空任务列表、依赖引用非法）
    #[error("Goal decomposition failed: {0}")]
    Decomposition(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),
}
