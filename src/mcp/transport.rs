//! 传输层：行分隔 JSON 的收发抽象
//!
//! StdioTransport 启动子进程并通过其 stdin/stdout 通讯；close 杀掉子进程。
//! 测试用的内存 duplex 传输实现在集成测试里，不进主代码。

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::ServerConfig;

/// 一条连接的底层传输：发一行、收一行、关闭
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, line: &str) -> Result<(), String>;

    /// 收下一行；流结束返回 Ok(None)
    async fn recv(&mut self) -> Result<Option<String>, String>;

    /// 尽力而为的关闭，不返回错误
    async fn close(&mut self);
}

/// 子进程 stdio 传输
pub struct StdioTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StdioTransport {
    /// 按服务器配置启动子进程并接管其 stdio
    pub fn spawn(config: &ServerConfig) -> Result<Self, String> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn '{}': {e}", config.command))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "child stdin unavailable".to_string())?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| "child stdout unavailable".to_string())?;

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, line: &str) -> Result<(), String> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("write failed: {e}"))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| format!("write failed: {e}"))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| format!("flush failed: {e}"))
    }

    async fn recv(&mut self) -> Result<Option<String>, String> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| format!("read failed: {e}"))?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(line.trim_end().to_string()))
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("child kill on close: {e}");
        }
    }
}
