//! Agent 身份：创建后只读

use serde::{Deserialize, Serialize};

/// Agent 类型（决定默认的任务处理路径，见 agent::handler）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    General,
    Rag,
    Code,
    Research,
    Analysis,
}

impl Default for AgentKind {
    fn default() -> Self {
        Self::General
    }
}

impl AgentKind {
    /// 从配置字符串解析，未知值回落为 General
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "rag" => Self::Rag,
            "code" => Self::Code,
            "research" => Self::Research,
            "analysis" => Self::Analysis,
            _ => Self::General,
        }
    }
}

/// Agent 身份描述：进程生命周期内创建一次，之后只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub agent_id: String,
    pub name: String,
    pub kind: AgentKind,
    /// 能力标签（供上层路由/展示，不参与策略判定）
    pub capabilities: Vec<String>,
    /// 允许的动作名或前缀；空 = 全部允许（仍受策略 deny 列表约束）
    pub permitted_actions: Vec<String>,
    pub created_at: i64,
}

impl Identity {
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            capabilities: Vec::new(),
            permitted_actions: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_capabilities(mut self, caps: Vec<String>) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn with_permitted_actions(mut self, actions: Vec<String>) -> Self {
        self.permitted_actions = actions;
        self
    }
}
