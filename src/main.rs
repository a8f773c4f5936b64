//! forager CLI：执行一个目标并打印结果
//!
//! 用法：forager [--config <path>] <goal text...>
//! 服务器注册表与策略来自 config/default.toml（FORAGER__* 环境变量可覆盖）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use forager::config::load_config;
use forager::llm::{LlmClient, MockLlmClient, OpenAiClient};
use forager::Agent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path: Option<PathBuf> = None;
    if args.first().map(|a| a == "--config").unwrap_or(false) {
        args.remove(0);
        if args.is_empty() {
            anyhow::bail!("--config requires a path");
        }
        config_path = Some(PathBuf::from(args.remove(0)));
    }
    if args.is_empty() {
        eprintln!("Usage: forager [--config <path>] <goal text...>");
        std::process::exit(1);
    }
    let goal_text = args.join(" ");

    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        Default::default()
    });

    let llm: Arc<dyn LlmClient> = if std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!("using OpenAI-compatible LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            None,
        ))
    } else {
        tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
        Arc::new(MockLlmClient::new(vec![
            r#"{"tasks": [{"action": "add", "description": "Add 2 and 2", "parameters": {"a": 2, "b": 2}, "depends_on": []}]}"#,
        ]))
    };

    let mut agent = Agent::from_config(&cfg, llm);
    let result = agent.execute_goal(&goal_text, HashMap::new()).await;
    agent.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success() {
        std::process::exit(1);
    }
    Ok(())
}
