//! 端到端目标执行测试：脚本化 LLM + 内存工具服务器

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{manager_with, test_config, StubServer};
use forager::llm::MockLlmClient;
use forager::ontology::{GoalStatus, TaskStatus};
use forager::Agent;

const TIMEOUT: Duration = Duration::from_secs(5);

fn plan(tasks: &[serde_json::Value]) -> String {
    json!({ "tasks": tasks }).to_string()
}

/// "计算 2+2" 场景：单任务分解，工具返回 4
#[tokio::test]
async fn single_task_goal_completes() {
    let server = StubServer::new("math").with_add();
    let manager = Arc::new(manager_with(&[server], TIMEOUT, TIMEOUT));
    let llm = Arc::new(MockLlmClient::new(vec![&plan(&[json!({
        "action": "add",
        "description": "add 2 and 2",
        "parameters": {"a": 2, "b": 2},
    })])]));
    let cfg = test_config(&["math"], 2);
    let mut agent = Agent::new(&cfg, llm, manager);

    let result = agent.execute_goal("compute 2+2", HashMap::new()).await;
    assert_eq!(result.status, GoalStatus::Completed);
    assert!(result.success());
    assert_eq!(result.task_results.len(), 1);
    assert_eq!(result.task_results[0].status, TaskStatus::Succeeded);
    assert_eq!(result.task_results[0].payload, Some(json!(4.0)));
    assert!(result.causes.is_empty());
}

/// A -> B 依赖链：B 只有在 A 成功后才会派发
#[tokio::test]
async fn dependent_tasks_run_in_order() {
    let server = StubServer::new("math")
        .with_add()
        .with_tool("report", json!({"type": "object"}), |_| Ok(json!("done")));
    let manager = Arc::new(manager_with(&[server], TIMEOUT, TIMEOUT));
    let llm = Arc::new(MockLlmClient::new(vec![&plan(&[
        json!({
            "action": "add",
            "description": "compute the sum",
            "parameters": {"a": 1, "b": 2},
        }),
        json!({
            "action": "report",
            "description": "report the sum",
            "depends_on": [0],
        }),
    ])]));
    let cfg = test_config(&["math"], 2);
    let mut agent = Agent::new(&cfg, llm, manager);

    let result = agent.execute_goal("sum then report", HashMap::new()).await;
    assert_eq!(result.status, GoalStatus::Completed);
    assert_eq!(result.task_results.len(), 2);
    assert_eq!(result.task_results[0].action, "add");
    assert_eq!(result.task_results[1].action, "report");
    assert!(result
        .task_results
        .iter()
        .all(|r| r.status == TaskStatus::Succeeded));
}

/// 零重试下未知动作耗尽预算，目标 Failed 且带原因
#[tokio::test]
async fn unknown_action_fails_goal_without_retry_budget() {
    let server = StubServer::new("math").with_add();
    let manager = Arc::new(manager_with(&[server], TIMEOUT, TIMEOUT));
    let llm = Arc::new(MockLlmClient::new(vec![&plan(&[json!({
        "action": "teleport",
        "description": "not a real tool",
    })])]));
    let cfg = test_config(&["math"], 0);
    let mut agent = Agent::new(&cfg, llm, manager);

    let result = agent.execute_goal("go somewhere", HashMap::new()).await;
    assert_eq!(result.status, GoalStatus::Failed);
    assert!(!result.success());
    assert_eq!(result.task_results.len(), 1);
    assert_eq!(result.task_results[0].status, TaskStatus::Failed);
    assert!(!result.causes.is_empty());
}

/// 首次失败、第二次成功：重试预算吸收瞬时故障
#[tokio::test]
async fn transient_failure_is_retried_to_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = StubServer::new("flaky").with_tool(
        "fetch",
        json!({"type": "object"}),
        move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("transient".to_string())
            } else {
                Ok(json!("payload"))
            }
        },
    );
    let manager = Arc::new(manager_with(&[server], TIMEOUT, TIMEOUT));
    let llm = Arc::new(MockLlmClient::new(vec![&plan(&[json!({
        "action": "fetch",
        "description": "fetch the thing",
    })])]));
    let cfg = test_config(&["flaky"], 1);
    let mut agent = Agent::new(&cfg, llm, manager);

    let result = agent.execute_goal("fetch it", HashMap::new()).await;
    assert_eq!(result.status, GoalStatus::Completed);
    assert_eq!(result.task_results[0].status, TaskStatus::Succeeded);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// 可选任务耗尽预算转 Skipped，目标仍 Completed
#[tokio::test]
async fn optional_failure_is_skipped_not_fatal() {
    let server = StubServer::new("math")
        .with_add()
        .with_tool("decorate", json!({"type": "object"}), |_| {
            Err("no decorations today".to_string())
        });
    let manager = Arc::new(manager_with(&[server], TIMEOUT, TIMEOUT));
    let llm = Arc::new(MockLlmClient::new(vec![&plan(&[
        json!({
            "action": "add",
            "description": "the real work",
            "parameters": {"a": 1, "b": 1},
        }),
        json!({
            "action": "decorate",
            "description": "nice to have",
            "optional": true,
        }),
    ])]));
    let cfg = test_config(&["math"], 0);
    let mut agent = Agent::new(&cfg, llm, manager);

    let result = agent.execute_goal("work plus garnish", HashMap::new()).await;
    assert_eq!(result.status, GoalStatus::Completed);
    let skipped = result
        .task_results
        .iter()
        .find(|r| r.action == "decorate")
        .unwrap();
    assert_eq!(skipped.status, TaskStatus::Skipped);
    // 可选任务的失败不计入目标失败原因
    assert!(result.causes.is_empty());
}

/// 分解两次均不可用：目标 Failed，无任务进入执行，且第二次 prompt 带纠错说明
#[tokio::test]
async fn unusable_decomposition_fails_goal_after_one_retry() {
    let server = StubServer::new("math").with_add();
    let manager = Arc::new(manager_with(&[server], TIMEOUT, TIMEOUT));
    let llm = Arc::new(MockLlmClient::new(vec![
        "I cannot produce JSON today",
        "still not JSON",
    ]));
    let cfg = test_config(&["math"], 2);
    let mut agent = Agent::new(&cfg, llm.clone(), manager);

    let result = agent.execute_goal("do something", HashMap::new()).await;
    assert_eq!(result.status, GoalStatus::Failed);
    assert!(result.task_results.is_empty());
    assert!(!result.causes.is_empty());

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("invalid"));
}

/// 执行中取消：不再派发后继任务，目标 Abandoned，会话被拆除
#[tokio::test]
async fn cancellation_abandons_goal_and_tears_down_sessions() {
    let server = StubServer::new("slow").with_add();
    *server.call_delay.lock().unwrap() = Some(Duration::from_millis(300));
    let manager = Arc::new(manager_with(&[server.clone()], TIMEOUT, TIMEOUT));
    let llm = Arc::new(MockLlmClient::new(vec![&plan(&[
        json!({
            "action": "add",
            "description": "first",
            "parameters": {"a": 1, "b": 1},
        }),
        json!({
            "action": "add",
            "description": "second, never dispatched",
            "parameters": {"a": 2, "b": 2},
            "depends_on": [0],
        }),
    ])]));
    let cfg = test_config(&["slow"], 2);
    let mut agent = Agent::new(&cfg, llm, manager);

    let cancel = agent.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let result = agent.execute_goal("two slow steps", HashMap::new()).await;
    assert_eq!(result.status, GoalStatus::Abandoned);
    // 第一棒可能已落地，第二棒绝不会派发
    assert!(result.task_results.len() <= 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.closed.load(Ordering::SeqCst));
}
