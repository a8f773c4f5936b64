//! 目标实体与终态快照

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ontology::task::TaskResult;

/// 目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    /// 已创建，尚未分解/执行
    Pending,
    /// 至少一个任务已离开 Pending
    InProgress,
    /// 全部任务 Succeeded 或 Skipped
    Completed,
    /// 某个必需任务耗尽重试预算
    Failed,
    /// 外部取消
    Abandoned,
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Abandoned)
    }
}

/// 目标：一次请求的工作单元，拥有有序的任务 id 列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub description: String,
    /// 0（最高）到 10（最低）
    pub priority: u8,
    /// 上下文键值约束（注入分解 prompt）
    pub context: HashMap<String, String>,
    pub status: GoalStatus,
    /// 插入顺序 = 声明的依赖顺序（显式依赖边可覆盖）
    pub task_ids: Vec<String>,
    pub attempts: u32,
    pub failure_reasons: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Goal {
    pub fn new(description: impl Into<String>, priority: u8, context: HashMap<String, String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            goal_id: format!("goal_{}", uuid::Uuid::new_v4()),
            description: description.into(),
            priority,
            context,
            status: GoalStatus::Pending,
            task_ids: Vec::new(),
            attempts: 0,
            failure_reasons: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// 目标终态快照：execute_goal 的返回值，永远携带显式终态而非裸异常
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalResult {
    pub goal_id: String,
    pub status: GoalStatus,
    /// 按执行完成顺序排列的任务快照
    pub task_results: Vec<TaskResult>,
    /// Failed / Abandoned 时逐任务的失败原因
    pub causes: Vec<String>,
    pub execution_time_ms: u64,
}

impl GoalResult {
    pub fn success(&self) -> bool {
        self.status == GoalStatus::Completed
    }
}
