//! 目标分解：LLM 结构化输出契约
//!
//! 把目标的自由文本描述转成有序 TaskSpec 列表。模型输出必须符合
//! DecomposedTasks 的 JSON Schema（schemars 生成并嵌入 prompt）；
//! 解析失败给一次附带错误信息的纠错重试，再失败即 Decomposition 错误。
//! 空任务列表同样是错误——零任务的目标会平凡地「完成」，必须上报而非静默。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::ontology::{Goal, TaskSpec};

/// LLM 必须返回的顶层结构
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecomposedTasks {
    pub tasks: Vec<TaskSpec>,
}

const SYSTEM_PROMPT: &str = "You are a planning assistant. \
You decompose a high-level goal into a list of atomic, actionable tasks \
and respond with a single JSON object, nothing else.";

/// 生成分解 prompt：内嵌输出 schema 与目标上下文约束
pub fn decomposition_prompt(goal: &Goal) -> String {
    let schema = schemars::schema_for!(DecomposedTasks);
    let schema = serde_json::to_string_pretty(&schema.schema).unwrap_or_else(|_| "{}".into());

    let mut context = String::new();
    if !goal.context.is_empty() {
        context.push_str("\nConstraints (key: value):\n");
        let mut pairs: Vec<_> = goal.context.iter().collect();
        pairs.sort();
        for (k, v) in pairs {
            context.push_str(&format!("- {k}: {v}\n"));
        }
    }

    format!(
        "Decompose the following goal into a list of atomic, actionable tasks.\n\
         Each task needs an 'action' (a concise verb phrase, also the tool name), \
         a 'description' detailed enough for another agent to execute it, \
         'parameters' for the tool call, and 'depends_on': zero-based indices \
         of earlier tasks in this list that must succeed first.\n\n\
         Return a JSON object matching this schema:\n{schema}\n\
         {context}\nGoal: {goal_text}\n\nJSON Response:",
        goal_text = goal.description,
    )
}

/// 从 LLM 输出中提取 JSON 块（```json 围栏或首尾大括号）
fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn parse_tasks(output: &str) -> Result<Vec<TaskSpec>, String> {
    let json = extract_json(output).ok_or_else(|| "no JSON object in output".to_string())?;
    let decomposed: DecomposedTasks =
        serde_json::from_str(json).map_err(|e| format!("schema mismatch: {e}"))?;
    Ok(decomposed.tasks)
}

/// 引用只允许指向更早的条目
fn validate_specs(specs: &[TaskSpec]) -> Result<(), String> {
    if specs.is_empty() {
        return Err("decomposition produced zero tasks".to_string());
    }
    for (i, spec) in specs.iter().enumerate() {
        if spec.action.trim().is_empty() {
            return Err(format!("task {i} has an empty action"));
        }
        for &dep in &spec.depends_on {
            if dep >= i {
                return Err(format!(
                    "task {i} ('{}') depends_on {dep}, which is not an earlier task",
                    spec.action
                ));
            }
        }
    }
    Ok(())
}

/// 目标分解器：持有 LLM 客户端，一次纠错重试
pub struct Decomposer {
    llm: Arc<dyn LlmClient>,
}

impl Decomposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 分解目标为 TaskSpec 列表
    ///
    /// 第一次解析/校验失败时，把错误信息附到 prompt 末尾重试一次；
    /// 仍失败或列表为空则返回 Decomposition 错误，绝不退化为空任务集。
    pub async fn decompose(&self, goal: &Goal) -> Result<Vec<TaskSpec>, AgentError> {
        let prompt = decomposition_prompt(goal);
        let output = self
            .llm
            .complete(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(AgentError::Llm)?;

        let first_error = match parse_tasks(&output).and_then(|specs| {
            validate_specs(&specs)?;
            Ok(specs)
        }) {
            Ok(specs) => return Ok(specs),
            Err(e) => e,
        };

        tracing::warn!("decomposition parse failed, retrying once: {first_error}");
        let retry_prompt = format!(
            "{prompt}\n\nYour previous response was invalid: {first_error}\n\
             Respond again with a single valid JSON object matching the schema."
        );
        let output = self
            .llm
            .complete(SYSTEM_PROMPT, &retry_prompt)
            .await
            .map_err(AgentError::Llm)?;

        parse_tasks(&output)
            .and_then(|specs| {
                validate_specs(&specs)?;
                Ok(specs)
            })
            .map_err(AgentError::Decomposition)
    }
}
