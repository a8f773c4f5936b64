//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，
//! 如 `FORAGER__LLM__MODEL=gpt-4o-mini`）。
//! 服务器注册表与策略均通过本配置注入 ConnectionManager / Agent，
//! 不存在进程级可变单例。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub policy: PolicySection,
    /// [servers.NAME] 表：逻辑服务器名 -> 启动描述
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

/// [agent] 段：名称、类型、能力标签
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// general / rag / code / research / analysis
    #[serde(default = "default_agent_kind")]
    pub kind: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_agent_name() -> String {
    "forager".to_string()
}

fn default_agent_kind() -> String {
    "general".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            kind: default_agent_kind(),
            capabilities: Vec::new(),
        }
    }
}

/// [llm] 段：OpenAI 兼容端点与模型
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// LLM 请求超时（秒）
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// [execution] 段：重试预算、并发上限、各类超时
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    /// 每个任务失败后的重试次数（不含首次尝试）
    #[serde(default = "default_task_retries")]
    pub task_retries: u32,
    /// READY 任务并发派发上限
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// 连接握手超时（秒）
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_task_retries() -> u32 {
    2
}

fn default_max_concurrent_tasks() -> usize {
    3
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            task_retries: default_task_retries(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            call_timeout_secs: default_call_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// [policy] 段：动作白名单、禁用类别、文件系统根
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    /// 允许的动作名或前缀（空 = 全部允许，再经 denied 过滤）
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    /// 禁用的动作类别（按前缀匹配，如 "shell"、"delete"）
    #[serde(default = "default_denied_categories")]
    pub denied_categories: Vec<String>,
    /// 参数中的路径必须落在这些根目录之下；空 = 不做路径限制
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
}

fn default_denied_categories() -> Vec<String> {
    vec!["shell".into(), "delete".into(), "sudo".into()]
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            allowed_actions: Vec::new(),
            denied_categories: default_denied_categories(),
            allowed_roots: Vec::new(),
        }
    }
}

/// 一个工具服务器的启动描述（stdio 子进程）
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub description: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            llm: LlmSection::default(),
            execution: ExecutionSection::default(),
            policy: PolicySection::default(),
            servers: HashMap::new(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
