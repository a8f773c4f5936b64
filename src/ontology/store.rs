//! Ontology 存储：目标/任务状态机与 DAG 校验
//!
//! 全部操作同步、不阻塞（悬挂点只在连接与工具调用层）。
//! 任务状态单调：终态不可回退；Running 仅当全部依赖满足。
//! 每次任务迁移后反应式重算所属目标状态。

use std::collections::{HashMap, HashSet};

use crate::core::AgentError;
use crate::ontology::{Goal, GoalStatus, Task, TaskStatus};

/// Identity / Goal / Task 的内存存储与校验规则
#[derive(Default)]
pub struct Ontology {
    goals: HashMap<String, Goal>,
    tasks: HashMap<String, Task>,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建目标：总是成功，初始 Pending
    pub fn create_goal(
        &mut self,
        description: impl Into<String>,
        priority: u8,
        context: HashMap<String, String>,
    ) -> Goal {
        let goal = Goal::new(description, priority, context);
        self.goals.insert(goal.goal_id.clone(), goal.clone());
        goal
    }

    /// 向目标追加任务
    ///
    /// 失败条件：goal_id 未知；依赖引用了不存在或不属于同一目标的任务
    /// （即不允许前向引用）；依赖图成环。失败时无任何可见的部分修改。
    pub fn add_task(&mut self, goal_id: &str, task: Task) -> Result<Task, AgentError> {
        if !self.goals.contains_key(goal_id) {
            return Err(AgentError::Validation(format!("unknown goal: {goal_id}")));
        }

        if let Some(path) = self.find_cycle(&task) {
            return Err(AgentError::CyclicDependency(path.join(" -> ")));
        }

        for dep in &task.dependencies {
            match self.tasks.get(dep) {
                None => {
                    return Err(AgentError::Validation(format!(
                        "task {} depends on unknown task {}",
                        task.task_id, dep
                    )))
                }
                Some(t) if t.goal_id != goal_id => {
                    return Err(AgentError::Validation(format!(
                        "task {} depends on task {} of another goal",
                        task.task_id, dep
                    )))
                }
                Some(_) => {}
            }
        }

        let mut task = task;
        task.goal_id = goal_id.to_string();
        self.goals
            .get_mut(goal_id)
            .map(|g| g.task_ids.push(task.task_id.clone()));
        let task_id = task.task_id.clone();
        self.tasks.insert(task_id.clone(), task.clone());
        self.promote_ready(goal_id);
        Ok(self.tasks.get(&task_id).cloned().unwrap_or(task))
    }

    /// 把依赖已全部满足的 Pending 任务推进到 Ready（无依赖的任务入库即 Ready）
    fn promote_ready(&mut self, goal_id: &str) {
        let Some(goal) = self.goals.get(goal_id) else {
            return;
        };
        let promotable: Vec<String> = goal
            .task_ids
            .iter()
            .filter(|id| {
                self.tasks
                    .get(*id)
                    .map(|t| t.status == TaskStatus::Pending)
                    .unwrap_or(false)
                    && self.dependencies_satisfied(id)
            })
            .cloned()
            .collect();
        for id in promotable {
            if let Some(t) = self.tasks.get_mut(&id) {
                t.status = TaskStatus::Ready;
            }
        }
    }

    /// 检测把 `new_task` 加入后是否成环；返回环上的任务 id 片段
    ///
    /// 新增的边全部由新任务指向既有任务，因此新环必然穿过新任务本身：
    /// 从其依赖出发做可达性 DFS，命中新任务 id（含自依赖）即成环。
    fn find_cycle(&self, new_task: &Task) -> Option<Vec<String>> {
        let target = &new_task.task_id;
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = new_task.dependencies.clone();

        while let Some(id) = stack.pop() {
            if &id == target {
                return Some(vec![new_task.task_id.clone(), id]);
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(t) = self.tasks.get(&id) {
                stack.extend(t.dependencies.iter().cloned());
            }
        }
        None
    }

    /// 任务状态迁移：强制单调不变量，迁移成功后重算目标状态
    pub fn transition_task(
        &mut self,
        task_id: &str,
        new_status: TaskStatus,
        result: Option<serde_json::Value>,
    ) -> Result<(), AgentError> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| AgentError::Validation(format!("unknown task: {task_id}")))?;
        let from = task.status;

        if from.is_terminal() {
            return Err(AgentError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to: new_status,
                reason: "terminal status is immutable".into(),
            });
        }

        if new_status == TaskStatus::Running && !self.dependencies_satisfied(task_id) {
            return Err(AgentError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to: new_status,
                reason: "dependencies not satisfied".into(),
            });
        }

        let allowed = match (from, new_status) {
            (TaskStatus::Pending, TaskStatus::Ready)
            | (TaskStatus::Pending, TaskStatus::Running)
            | (TaskStatus::Pending, TaskStatus::Skipped)
            | (TaskStatus::Ready, TaskStatus::Running)
            | (TaskStatus::Ready, TaskStatus::Skipped)
            // 重试：失败的尝试（预算未耗尽）回到 Pending，不触碰终态
            | (TaskStatus::Running, TaskStatus::Pending)
            | (TaskStatus::Running, TaskStatus::Succeeded)
            | (TaskStatus::Running, TaskStatus::Failed)
            | (TaskStatus::Running, TaskStatus::Skipped) => true,
            _ => false,
        };
        if !allowed {
            return Err(AgentError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to: new_status,
                reason: "transition not permitted".into(),
            });
        }

        let goal_id = {
            let Some(task) = self.tasks.get_mut(task_id) else {
                return Err(AgentError::Validation(format!("unknown task: {task_id}")));
            };
            let now = chrono::Utc::now().timestamp_millis();
            task.status = new_status;
            match new_status {
                TaskStatus::Running => {
                    task.started_at = Some(now);
                    task.attempts += 1;
                }
                s if s.is_terminal() => task.completed_at = Some(now),
                _ => {}
            }
            if let Some(r) = result {
                task.result = Some(r);
            }
            task.goal_id.clone()
        };

        self.promote_ready(&goal_id);
        self.recompute_goal_status(&goal_id);
        Ok(())
    }

    /// 任务的全部依赖是否已处于 {Succeeded, Skipped}
    pub fn dependencies_satisfied(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .map(|t| {
                t.dependencies.iter().all(|d| {
                    self.tasks
                        .get(d)
                        .map(|dep| dep.status.satisfies_dependency())
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// 目标状态反应式重算：
    /// 全部任务终态且满足依赖语义 → Completed；
    /// 出现 Failed（必需任务耗尽预算才会被标成 Failed）→ Failed；
    /// 否则只要有任务离开 Pending → InProgress。
    fn recompute_goal_status(&mut self, goal_id: &str) {
        let Some(goal) = self.goals.get(goal_id) else {
            return;
        };
        // Abandoned 由取消路径显式设置，不被重算覆盖
        if goal.status == GoalStatus::Abandoned {
            return;
        }

        let tasks: Vec<&Task> = goal
            .task_ids
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect();

        let new_status = if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
            GoalStatus::Failed
        } else if !tasks.is_empty() && tasks.iter().all(|t| t.status.satisfies_dependency()) {
            GoalStatus::Completed
        } else if tasks.iter().any(|t| t.status != TaskStatus::Pending) {
            GoalStatus::InProgress
        } else {
            GoalStatus::Pending
        };

        if let Some(goal) = self.goals.get_mut(goal_id) {
            if goal.status != new_status {
                goal.status = new_status;
                goal.updated_at = chrono::Utc::now().timestamp_millis();
            }
        }
    }

    /// 目标取消：设为 Abandoned（终态，之后的任务迁移不再改写目标状态）
    pub fn abandon_goal(&mut self, goal_id: &str, reason: impl Into<String>) {
        if let Some(goal) = self.goals.get_mut(goal_id) {
            goal.status = GoalStatus::Abandoned;
            goal.failure_reasons.push(reason.into());
            goal.updated_at = chrono::Utc::now().timestamp_millis();
        }
    }

    /// 目标在执行开始前即告失败（如分解中止）：直接落 Failed 并记录原因
    pub fn fail_goal(&mut self, goal_id: &str, reason: impl Into<String>) {
        if let Some(goal) = self.goals.get_mut(goal_id) {
            goal.status = GoalStatus::Failed;
            goal.failure_reasons.push(reason.into());
            goal.updated_at = chrono::Utc::now().timestamp_millis();
        }
    }

    pub fn record_goal_failure(&mut self, goal_id: &str, reason: impl Into<String>) {
        if let Some(goal) = self.goals.get_mut(goal_id) {
            goal.failure_reasons.push(reason.into());
        }
    }

    pub fn goal(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.get(goal_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn record_task_error(&mut self, task_id: &str, error: impl Into<String>) {
        if let Some(t) = self.tasks.get_mut(task_id) {
            t.error_messages.push(error.into());
        }
    }

    /// 目标下当前可派发的任务（Pending/Ready 且依赖全部满足），按插入顺序
    pub fn ready_tasks(&self, goal_id: &str) -> Vec<Task> {
        let Some(goal) = self.goals.get(goal_id) else {
            return Vec::new();
        };
        goal.task_ids
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready))
            .filter(|t| self.dependencies_satisfied(&t.task_id))
            .cloned()
            .collect()
    }

    /// 目标下尚未到达终态的任务数
    pub fn unfinished_tasks(&self, goal_id: &str) -> usize {
        self.goals
            .get(goal_id)
            .map(|g| {
                g.task_ids
                    .iter()
                    .filter_map(|id| self.tasks.get(id))
                    .filter(|t| !t.is_finished())
                    .count()
            })
            .unwrap_or(0)
    }
}
