//! Agent 本体：Identity / Goal / Task 的内存模型与校验规则
//!
//! - **identity**: Agent 不可变身份描述（名称、类型、能力标签、权限集）
//! - **goal**: 目标实体与终态快照（GoalResult）
//! - **task**: 任务实体、分解记录（TaskSpec）与终态快照（TaskResult）
//! - **store**: Ontology 存储：目标/任务创建、DAG 校验、状态机与目标状态联动
//! - **policy**: 动作策略校验（纯函数，永不抛错）

pub mod goal;
pub mod identity;
pub mod policy;
pub mod store;
pub mod task;

pub use goal::{Goal, GoalResult, GoalStatus};
pub use identity::{AgentKind, Identity};
pub use policy::ActionPolicy;
pub use store::Ontology;
pub use task::{Task, TaskResult, TaskSpec, TaskStatus};
