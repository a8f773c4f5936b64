//! 工具执行器：把 Task 桥接到一次具体的工具调用
//!
//! 五步：能力解析（含 hint 消歧）→ input_schema 参数校验 → 动作策略校验 →
//! 经 ConnectionManager 派发 → 包装为 TaskResult。
//! 解析/校验类失败作为错误向上传播（结构性问题）；
//! 传输层失败转为 Failed 的 TaskResult——工具失败是数据不是控制流，
//! 由编排器统一套用重试/放弃策略。每次调用输出 JSON 审计日志。

use std::sync::Arc;
use std::time::Instant;

use crate::core::AgentError;
use crate::mcp::types::ToolCapability;
use crate::mcp::ConnectionManager;
use crate::ontology::{ActionPolicy, Identity, Task, TaskResult, TaskStatus};

/// 工具执行器：持有连接管理器与动作策略
pub struct ToolExecutor {
    manager: Arc<ConnectionManager>,
    policy: ActionPolicy,
}

impl ToolExecutor {
    pub fn new(manager: Arc<ConnectionManager>, policy: ActionPolicy) -> Self {
        Self { manager, policy }
    }

    /// 在已连接服务器的能力缓存中解析 task.action 对应的唯一工具
    ///
    /// 多候选时用 required_tool_hints 收敛（hint = 服务器名或 "server/tool"）；
    /// 收敛不到唯一即 AmbiguousTool，无候选即 NoCapableTool。
    pub fn resolve(&self, task: &Task) -> Result<ToolCapability, AgentError> {
        let mut candidates: Vec<ToolCapability> = self
            .manager
            .list_capabilities(None)
            .into_iter()
            .filter(|cap| cap.name == task.action)
            .collect();

        if candidates.is_empty() {
            return Err(AgentError::NoCapableTool(task.action.clone()));
        }

        if candidates.len() > 1 && !task.required_tool_hints.is_empty() {
            candidates.retain(|cap| {
                task.required_tool_hints
                    .iter()
                    .any(|h| h == &cap.server || h == &cap.qualified_name())
            });
            if candidates.is_empty() {
                return Err(AgentError::NoCapableTool(task.action.clone()));
            }
        }

        if candidates.len() > 1 {
            return Err(AgentError::AmbiguousTool {
                action: task.action.clone(),
                candidates: candidates.iter().map(|c| c.qualified_name()).collect(),
            });
        }

        Ok(candidates.remove(0))
    }

    /// 解析成功的工具所在的服务器集合（供编排器懒连接）
    pub fn candidate_servers(&self, task: &Task) -> Vec<String> {
        if !task.required_tool_hints.is_empty() {
            task.required_tool_hints
                .iter()
                .map(|h| h.split('/').next().unwrap_or(h).to_string())
                .collect()
        } else {
            self.manager.registered_servers()
        }
    }

    /// 执行任务：校验失败向上传播，传输失败落为 Failed TaskResult
    pub async fn execute(&self, identity: &Identity, task: &Task) -> Result<TaskResult, AgentError> {
        let start = Instant::now();

        let capability = self.resolve(task)?;
        self.validate_parameters(&capability, &task.parameters)?;

        if !self
            .policy
            .validate_action(identity, &task.action, &task.parameters)
        {
            return Err(AgentError::PermissionDenied(task.action.clone()));
        }

        let outcome = self
            .manager
            .call_tool(&capability.server, &capability.name, task.parameters.clone())
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        let qualified = capability.qualified_name();
        let (ok, outcome_tag): (bool, &str) = match &outcome {
            Ok(o) if !o.is_error => (true, "ok"),
            Ok(_) => (false, "remote_error"),
            Err(_) => (false, "transport_error"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "task": task.task_id,
            "tool": qualified,
            "ok": ok,
            "outcome": outcome_tag,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let result = match outcome {
            Ok(output) if !output.is_error => TaskResult {
                task_id: task.task_id.clone(),
                action: task.action.clone(),
                status: TaskStatus::Succeeded,
                payload: Some(output.payload),
                tool_used: Some(qualified),
                error: None,
                duration_ms,
            },
            Ok(output) => TaskResult {
                task_id: task.task_id.clone(),
                action: task.action.clone(),
                status: TaskStatus::Failed,
                payload: Some(output.payload.clone()),
                tool_used: Some(qualified),
                error: Some(format!("remote tool reported error: {}", output.payload)),
                duration_ms,
            },
            Err(e) => TaskResult {
                task_id: task.task_id.clone(),
                action: task.action.clone(),
                status: TaskStatus::Failed,
                payload: None,
                tool_used: Some(qualified),
                error: Some(e.to_string()),
                duration_ms,
            },
        };
        Ok(result)
    }

    fn validate_parameters(
        &self,
        capability: &ToolCapability,
        parameters: &serde_json::Value,
    ) -> Result<(), AgentError> {
        let compiled = jsonschema::JSONSchema::compile(&capability.input_schema).map_err(|e| {
            AgentError::SchemaValidation {
                tool: capability.qualified_name(),
                cause: format!("unusable input_schema: {e}"),
            }
        })?;

        if let Err(errors) = compiled.validate(parameters) {
            let cause = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AgentError::SchemaValidation {
                tool: capability.qualified_name(),
                cause,
            });
        }
        Ok(())
    }
}
