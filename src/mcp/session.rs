//! Session：一个已连接服务器的所有权记录
//!
//! 每个 Session 由一个 actor 任务独占传输，外部通过 mpsc + oneshot 排队请求，
//! 从而把「每 Session 串行化调用」落实为队列纪律而非单线程巧合。
//! Session 实例一旦关闭即作废，重连会创建新的 Session 对象。

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::mcp::transport::Transport;
use crate::mcp::types::{JsonRpcRequest, JsonRpcResponse};

enum SessionCommand {
    Request {
        request: JsonRpcRequest,
        reply: oneshot::Sender<Result<Value, String>>,
    },
    Shutdown,
}

/// 逻辑服务器名与活传输句柄的绑定；由 ConnectionManager 独占持有
pub struct Session {
    server_name: String,
    tx: mpsc::Sender<SessionCommand>,
    next_id: AtomicU64,
}

impl Session {
    /// 接管传输并启动 actor 任务
    pub fn start(server_name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let server_name = server_name.into();
        let (tx, rx) = mpsc::channel::<SessionCommand>(16);
        tokio::spawn(session_actor(server_name.clone(), transport, rx));
        Self {
            server_name,
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// 发出一次请求并等待对应 id 的响应；同一 Session 上的请求彼此串行
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Request {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| "session closed".to_string())?;
        reply_rx.await.map_err(|_| "session closed".to_string())?
    }

    /// 请求 actor 关闭传输；尽力而为，从不报错
    pub async fn close(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
    }
}

async fn session_actor(
    server_name: String,
    mut transport: Box<dyn Transport>,
    mut rx: mpsc::Receiver<SessionCommand>,
) {
    let mut broken: Option<String> = None;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::Shutdown => break,
            SessionCommand::Request { request, mut reply } => {
                if let Some(cause) = &broken {
                    let _ = reply.send(Err(format!("transport broken: {cause}")));
                    continue;
                }
                // 调用方超时放弃（reply 接收端被丢弃）时中断往返，
                // 否则 actor 会卡在 recv 上，既收不到 Shutdown 也关不掉传输
                let outcome = tokio::select! {
                    outcome = roundtrip(transport.as_mut(), &request) => Some(outcome),
                    _ = reply.closed() => None,
                };
                let Some(outcome) = outcome else {
                    tracing::debug!(
                        server = %server_name,
                        id = request.id,
                        "caller abandoned request"
                    );
                    continue;
                };
                if let Err(cause) = &outcome {
                    tracing::warn!(server = %server_name, "transport error: {cause}");
                    broken = Some(cause.clone());
                }
                let _ = reply.send(outcome);
            }
        }
    }

    transport.close().await;
    tracing::debug!(server = %server_name, "session actor stopped");
}

/// 发送请求并读取匹配 id 的响应；忽略服务器的通知行与无关行
async fn roundtrip(
    transport: &mut dyn Transport,
    request: &JsonRpcRequest,
) -> Result<Value, String> {
    let line = serde_json::to_string(request).map_err(|e| format!("encode failed: {e}"))?;
    transport.send(&line).await?;

    loop {
        let Some(line) = transport.recv().await? else {
            return Err("server closed the connection".to_string());
        };
        if line.is_empty() {
            continue;
        }
        let response: JsonRpcResponse = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(_) => {
                tracing::debug!("ignoring non-response line: {line}");
                continue;
            }
        };
        if response.id != request.id {
            continue;
        }
        if let Some(err) = response.error {
            return Err(format!("remote error {}: {}", err.code, err.message));
        }
        return Ok(response.result.unwrap_or(Value::Null));
    }
}
