//! Agent 编排器：端到端主控循环
//!
//! execute_goal：创建目标 → LLM 分解 → 按依赖序拣选 READY 任务 →
//! 有界并发派发（经 TaskHandler/ToolExecutor）→ 应用迁移，直到无 READY 任务。
//! 任务失败按重试预算重试；可选任务耗尽预算转 Skipped；必需任务耗尽即目标 Failed。
//! 服务器按需懒连接，拆除推迟到 shutdown / 取消路径。
//! 取消：停止派发、等在途任务落地、disconnect_all、返回 Abandoned。

pub mod handler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::decompose::Decomposer;
use crate::execute::ToolExecutor;
use crate::llm::LlmClient;
use crate::mcp::ConnectionManager;
use crate::ontology::{
    ActionPolicy, AgentKind, GoalResult, GoalStatus, Identity, Ontology, Task, TaskResult,
    TaskSpec, TaskStatus,
};

pub use handler::{HandlerRegistry, TaskHandler, ToolCallHandler};

/// 主控编排器：一次驱动一个目标
pub struct Agent {
    identity: Identity,
    ontology: Ontology,
    manager: Arc<ConnectionManager>,
    executor: Arc<ToolExecutor>,
    decomposer: Decomposer,
    handlers: HandlerRegistry,
    task_retries: u32,
    max_concurrent: usize,
    cancel: CancellationToken,
}

impl Agent {
    /// 从配置与 LLM 客户端组装全部组件
    pub fn from_config(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        let manager = Arc::new(ConnectionManager::new(
            cfg.servers.clone(),
            std::time::Duration::from_secs(cfg.execution.connect_timeout_secs),
            std::time::Duration::from_secs(cfg.execution.call_timeout_secs),
        ));
        Self::new(cfg, llm, manager)
    }

    /// 显式注入 ConnectionManager（测试用内存传输工厂时从这里进）
    pub fn new(cfg: &AppConfig, llm: Arc<dyn LlmClient>, manager: Arc<ConnectionManager>) -> Self {
        let identity = Identity::new(&cfg.agent.name, AgentKind::parse(&cfg.agent.kind))
            .with_capabilities(cfg.agent.capabilities.clone())
            .with_permitted_actions(cfg.policy.allowed_actions.clone());
        let policy = ActionPolicy::from_config(&cfg.policy);
        let executor = Arc::new(ToolExecutor::new(manager.clone(), policy));
        let handlers = HandlerRegistry::new(Arc::new(ToolCallHandler::new(executor.clone())));

        Self {
            identity,
            ontology: Ontology::new(),
            manager,
            executor,
            decomposer: Decomposer::new(llm),
            handlers,
            task_retries: cfg.execution.task_retries,
            max_concurrent: cfg.execution.max_concurrent_tasks.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// 外部取消句柄：cancel 后编排器不再派发新任务
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 注册动作前缀的专化 TaskHandler
    pub fn register_handler(&mut self, prefix: impl Into<String>, h: Arc<dyn TaskHandler>) {
        self.handlers.register(prefix, h);
    }

    /// 端到端执行一个目标；永远返回带显式终态的 GoalResult，绝不抛裸错误
    pub async fn execute_goal(
        &mut self,
        description: &str,
        context: HashMap<String, String>,
    ) -> GoalResult {
        let start = Instant::now();
        let goal = self.ontology.create_goal(description, 5, context);
        let goal_id = goal.goal_id.clone();
        tracing::info!(goal = %goal_id, "executing goal: {description}");

        // 分解失败中止整个目标（无部分任务集进入执行）
        let specs = match self.decomposer.decompose(&goal).await {
            Ok(specs) => specs,
            Err(e) => return self.fail_setup(&goal_id, start, e),
        };
        tracing::info!(goal = %goal_id, tasks = specs.len(), "goal decomposed");

        if let Err(e) = self.feed_tasks(&goal_id, specs) {
            let e = match e {
                AgentError::CyclicDependency(c) => {
                    AgentError::Decomposition(format!("cyclic dependency: {c}"))
                }
                other => other,
            };
            return self.fail_setup(&goal_id, start, e);
        }

        // 终态快照按任务聚合；重试会覆盖此前那次尝试的快照
        let mut snapshots: HashMap<String, TaskResult> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                return self.abandon(&goal_id, start, snapshots, order).await;
            }

            if self
                .ontology
                .goal(&goal_id)
                .map(|g| g.status.is_terminal())
                .unwrap_or(true)
            {
                break;
            }

            let ready = self.ontology.ready_tasks(&goal_id);
            if ready.is_empty() {
                break;
            }

            let batch: Vec<Task> = ready.into_iter().take(self.max_concurrent).collect();
            let mut join_set: JoinSet<(String, Result<TaskResult, AgentError>)> = JoinSet::new();

            for task in batch {
                self.ensure_servers(&task).await;
                if let Err(e) =
                    self.ontology
                        .transition_task(&task.task_id, TaskStatus::Running, None)
                {
                    tracing::warn!(task = %task.task_id, "dispatch skipped: {e}");
                    continue;
                }
                let handler = self.handlers.resolve(&task.action);
                let identity = self.identity.clone();
                join_set.spawn(async move {
                    let outcome = handler.handle(&identity, &task).await;
                    (task.task_id.clone(), outcome)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((task_id, outcome)) => {
                        self.apply_outcome(&goal_id, &task_id, outcome, &mut snapshots, &mut order)
                    }
                    Err(e) => tracing::error!("task join failed: {e}"),
                }
            }
        }

        if self.cancel.is_cancelled() {
            return self.abandon(&goal_id, start, snapshots, order).await;
        }

        self.collect(&goal_id, start, snapshots, order)
    }

    /// 关闭编排器：拆除全部会话（幂等）
    pub async fn shutdown(&self) {
        self.manager.disconnect_all().await;
    }

    /// 把分解记录按序喂给 Ontology；depends_on 序号映射为已创建任务的 id
    fn feed_tasks(&mut self, goal_id: &str, specs: Vec<TaskSpec>) -> Result<(), AgentError> {
        let mut ids: Vec<String> = Vec::new();
        for spec in specs {
            let deps = spec
                .depends_on
                .iter()
                .map(|&i| {
                    ids.get(i).cloned().ok_or_else(|| {
                        AgentError::Validation(format!("depends_on index {i} out of range"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let parameters = serde_json::Value::Object(spec.parameters.into_iter().collect());
            let mut task = Task::new(goal_id, spec.action, parameters)
                .with_description(spec.description)
                .with_dependencies(deps);
            if spec.optional {
                task = task.optional();
            }
            let task = self.ontology.add_task(goal_id, task)?;
            ids.push(task.task_id);
        }
        Ok(())
    }

    /// 懒连接任务可能用到的服务器；连接失败记日志，由解析阶段给出准确错误
    async fn ensure_servers(&self, task: &Task) {
        for server in self.executor.candidate_servers(task) {
            if self.manager.is_connected(&server) {
                continue;
            }
            if let Err(e) = self.manager.connect(&server).await {
                tracing::warn!(server = %server, "lazy connect failed: {e}");
            }
        }
    }

    /// 应用单个任务的执行结果：成功落终态，失败按预算重试 / Skipped / Failed
    fn apply_outcome(
        &mut self,
        goal_id: &str,
        task_id: &str,
        outcome: Result<TaskResult, AgentError>,
        snapshots: &mut HashMap<String, TaskResult>,
        order: &mut Vec<String>,
    ) {
        let (attempts, optional, action) = match self.ontology.task(task_id) {
            Some(t) => (t.attempts, t.optional, t.action.clone()),
            None => return,
        };

        let result = match outcome {
            Ok(r) => r,
            // 校验类错误（NoCapableTool / Schema / PermissionDenied ...）同样
            // 落为失败的尝试，让重试/放弃策略统一生效
            Err(e) => TaskResult {
                task_id: task_id.to_string(),
                action: action.clone(),
                status: TaskStatus::Failed,
                payload: None,
                tool_used: None,
                error: Some(e.to_string()),
                duration_ms: 0,
            },
        };

        if result.status == TaskStatus::Succeeded {
            if let Err(e) = self.ontology.transition_task(
                task_id,
                TaskStatus::Succeeded,
                result.payload.clone(),
            ) {
                tracing::error!(task = %task_id, "succeed transition rejected: {e}");
            }
            self.record(snapshots, order, result);
            return;
        }

        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());
        self.ontology.record_task_error(task_id, &error);

        if attempts <= self.task_retries {
            tracing::info!(
                task = %task_id,
                attempt = attempts,
                budget = self.task_retries + 1,
                "task failed, retrying: {error}"
            );
            if let Err(e) = self
                .ontology
                .transition_task(task_id, TaskStatus::Pending, None)
            {
                tracing::error!(task = %task_id, "retry transition rejected: {e}");
            }
            return;
        }

        let terminal = if optional {
            TaskStatus::Skipped
        } else {
            TaskStatus::Failed
        };
        if let Err(e) = self.ontology.transition_task(task_id, terminal, None) {
            tracing::error!(task = %task_id, "fail transition rejected: {e}");
        }
        if terminal == TaskStatus::Failed {
            self.ontology
                .record_goal_failure(goal_id, format!("task '{action}' failed: {error}"));
        }
        let mut result = result;
        result.status = terminal;
        self.record(snapshots, order, result);
    }

    fn record(
        &self,
        snapshots: &mut HashMap<String, TaskResult>,
        order: &mut Vec<String>,
        result: TaskResult,
    ) {
        if !snapshots.contains_key(&result.task_id) {
            order.push(result.task_id.clone());
        }
        snapshots.insert(result.task_id.clone(), result);
    }

    fn fail_setup(&mut self, goal_id: &str, start: Instant, e: AgentError) -> GoalResult {
        tracing::error!(goal = %goal_id, "goal setup failed: {e}");
        // 分解失败没有任务可言，目标直接落 Failed
        self.ontology.fail_goal(goal_id, e.to_string());
        GoalResult {
            goal_id: goal_id.to_string(),
            status: GoalStatus::Failed,
            task_results: Vec::new(),
            causes: vec![e.to_string()],
            execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn abandon(
        &mut self,
        goal_id: &str,
        start: Instant,
        snapshots: HashMap<String, TaskResult>,
        order: Vec<String>,
    ) -> GoalResult {
        tracing::info!(goal = %goal_id, "goal cancelled, tearing down sessions");
        self.ontology.abandon_goal(goal_id, "cancelled");
        self.manager.disconnect_all().await;
        self.collect(goal_id, start, snapshots, order)
    }

    fn collect(
        &self,
        goal_id: &str,
        start: Instant,
        mut snapshots: HashMap<String, TaskResult>,
        order: Vec<String>,
    ) -> GoalResult {
        // GoalResult 永远携带终态；正常路径在此之前目标已达终态
        let status = self
            .ontology
            .goal(goal_id)
            .map(|g| g.status)
            .filter(|s| s.is_terminal())
            .unwrap_or(GoalStatus::Failed);
        let causes = self
            .ontology
            .goal(goal_id)
            .map(|g| g.failure_reasons.clone())
            .unwrap_or_default();
        let task_results = order
            .into_iter()
            .filter_map(|id| snapshots.remove(&id))
            .collect();

        GoalResult {
            goal_id: goal_id.to_string(),
            status,
            task_results,
            causes,
            execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}
