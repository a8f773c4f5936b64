//! Forager - 目标驱动的智能体执行引擎
//!
//! 模块划分：
//! - **agent**: 编排器主控循环与 TaskHandler 注册表
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **decompose**: LLM 目标分解（结构化输出契约）
//! - **execute**: 工具执行器（能力解析、schema/策略校验、结果包装）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **mcp**: 工具服务器连接管理（传输、会话、能力缓存）
//! - **ontology**: Identity / Goal / Task 的内存模型与校验规则

pub mod agent;
pub mod config;
pub mod core;
pub mod decompose;
pub mod execute;
pub mod llm;
pub mod mcp;
pub mod ontology;

pub use agent::Agent;
pub use core::AgentError;
