//! LLM 客户端抽象
//!
//! 分解器只依赖这一层：给定 system + user prompt 返回文本。
//! 结构化输出契约（schema 校验、纠错重试）在 decompose 模块实现，
//! 与具体后端无关。

use async_trait::async_trait;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, String>;
}
