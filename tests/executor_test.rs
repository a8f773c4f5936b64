//! ToolExecutor 集成测试：解析、校验、调度落地为 TaskResult

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{manager_with, StubServer};
use forager::config::PolicySection;
use forager::execute::ToolExecutor;
use forager::mcp::ConnectionManager;
use forager::ontology::{ActionPolicy, AgentKind, Identity, Task, TaskStatus};
use forager::AgentError;

const TIMEOUT: Duration = Duration::from_millis(500);

fn identity() -> Identity {
    Identity::new("tester", AgentKind::General)
}

fn open_policy() -> ActionPolicy {
    ActionPolicy::default()
}

async fn connected_manager(servers: &[Arc<StubServer>]) -> Arc<ConnectionManager> {
    let manager = Arc::new(manager_with(servers, TIMEOUT, TIMEOUT));
    for s in servers {
        manager.connect(&s.name).await.unwrap();
    }
    manager
}

#[tokio::test]
async fn unknown_action_is_no_capable_tool() {
    let server = StubServer::new("alpha").with_add();
    let manager = connected_manager(&[server]).await;
    let executor = ToolExecutor::new(manager, open_policy());

    let task = Task::new("goal_x", "multiply", json!({}));
    let err = executor.execute(&identity(), &task).await.unwrap_err();
    assert!(matches!(err, AgentError::NoCapableTool(_)));
}

#[tokio::test]
async fn duplicate_capability_without_hint_is_ambiguous() {
    let a = StubServer::new("a").with_add();
    let b = StubServer::new("b").with_add();
    let manager = connected_manager(&[a, b]).await;
    let executor = ToolExecutor::new(manager, open_policy());

    let task = Task::new("goal_x", "add", json!({"a": 1, "b": 2}));
    let err = executor.execute(&identity(), &task).await.unwrap_err();
    match err {
        AgentError::AmbiguousTool { candidates, .. } => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected AmbiguousTool, got {other:?}"),
    }
}

#[tokio::test]
async fn hint_narrows_duplicate_capability() {
    let a = StubServer::new("a").with_add();
    let b = StubServer::new("b").with_add();
    let manager = connected_manager(&[a, b]).await;
    let executor = ToolExecutor::new(manager, open_policy());

    let task = Task::new("goal_x", "add", json!({"a": 2, "b": 3}))
        .with_hints(vec!["b".to_string()]);
    let result = executor.execute(&identity(), &task).await.unwrap();
    assert_eq!(result.status, TaskStatus::Succeeded);
    assert_eq!(result.tool_used.as_deref(), Some("b/add"));
    assert_eq!(result.payload, Some(json!(5.0)));
}

#[tokio::test]
async fn parameters_are_checked_against_input_schema() {
    let server = StubServer::new("alpha").with_add();
    let manager = connected_manager(&[server]).await;
    let executor = ToolExecutor::new(manager, open_policy());

    // 缺少必填字段 b
    let task = Task::new("goal_x", "add", json!({"a": 1}));
    let err = executor.execute(&identity(), &task).await.unwrap_err();
    match err {
        AgentError::SchemaValidation { tool, .. } => assert_eq!(tool, "alpha/add"),
        other => panic!("expected SchemaValidation, got {other:?}"),
    }
}

#[tokio::test]
async fn denied_category_blocks_execution() {
    let server = StubServer::new("alpha").with_tool(
        "shell_exec",
        json!({"type": "object"}),
        |_| Ok(json!("ran")),
    );
    let manager = connected_manager(&[server]).await;
    let policy = ActionPolicy::from_config(&PolicySection {
        allowed_actions: Vec::new(),
        denied_categories: vec!["shell".to_string()],
        allowed_roots: Vec::new(),
    });
    let executor = ToolExecutor::new(manager, policy);

    let task = Task::new("goal_x", "shell_exec", json!({}));
    let err = executor.execute(&identity(), &task).await.unwrap_err();
    assert!(matches!(err, AgentError::PermissionDenied(_)));
}

#[tokio::test]
async fn identity_permitted_actions_restrict_execution() {
    let server = StubServer::new("alpha").with_add();
    let manager = connected_manager(&[server]).await;
    let executor = ToolExecutor::new(manager, open_policy());

    let restricted =
        Identity::new("reader", AgentKind::General).with_permitted_actions(vec!["read".into()]);
    let task = Task::new("goal_x", "add", json!({"a": 1, "b": 2}));
    let err = executor.execute(&restricted, &task).await.unwrap_err();
    assert!(matches!(err, AgentError::PermissionDenied(_)));
}

#[tokio::test]
async fn remote_tool_error_becomes_failed_result() {
    let server = StubServer::new("alpha").with_tool(
        "flaky",
        json!({"type": "object"}),
        |_| Err("boom".to_string()),
    );
    let manager = connected_manager(&[server]).await;
    let executor = ToolExecutor::new(manager, open_policy());

    let task = Task::new("goal_x", "flaky", json!({}));
    let result = executor.execute(&identity(), &task).await.unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.error.as_deref().unwrap_or("").contains("boom"));
}

#[tokio::test]
async fn call_timeout_becomes_failed_result() {
    let server = StubServer::new("slow").with_add();
    let manager = Arc::new(manager_with(
        &[server.clone()],
        TIMEOUT,
        Duration::from_millis(50),
    ));
    manager.connect("slow").await.unwrap();
    *server.call_delay.lock().unwrap() = Some(Duration::from_secs(2));
    let executor = ToolExecutor::new(manager, open_policy());

    let task = Task::new("goal_x", "add", json!({"a": 1, "b": 2}));
    let result = executor.execute(&identity(), &task).await.unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.error.as_deref().unwrap_or("").contains("timed out"));
}
