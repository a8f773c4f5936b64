//! ConnectionManager：工具服务器会话的唯一管理者
//!
//! - connect 幂等：同名并发连接共享同一次握手（OnceCell 单飞），
//!   不同服务器互不阻塞；握手超时报 Connection 错误，不自动重试
//! - disconnect / disconnect_all 尽力而为且全量：拆除失败只记日志
//! - call_tool 是所有工具调用的唯一咽喉，按调用统一施加超时
//! - 能力缓存随每次 connect 握手整体重建，活服务器是权威来源

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::config::ServerConfig;
use crate::core::AgentError;
use crate::mcp::session::Session;
use crate::mcp::transport::{StdioTransport, Transport};
use crate::mcp::types::{
    CallToolParams, CallToolResult, InitializeResult, ListToolsResult, ToolCapability, ToolOutput,
    METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_LIST_TOOLS, PROTOCOL_VERSION,
};

/// 传输工厂：生产一条到指定服务器的传输（测试注入内存传输的接缝）
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, server_name: &str, config: &ServerConfig)
        -> Result<Box<dyn Transport>, String>;
}

/// 默认工厂：按配置启动 stdio 子进程
pub struct StdioTransportFactory;

#[async_trait]
impl TransportFactory for StdioTransportFactory {
    async fn create(
        &self,
        _server_name: &str,
        config: &ServerConfig,
    ) -> Result<Box<dyn Transport>, String> {
        Ok(Box::new(StdioTransport::spawn(config)?))
    }
}

/// 握手完成的会话及其能力快照
#[derive(Clone)]
struct ConnectedSession {
    session: Arc<Session>,
    capabilities: Arc<Vec<ToolCapability>>,
}

/// 工具服务器连接管理器
pub struct ConnectionManager {
    registry: HashMap<String, ServerConfig>,
    factory: Box<dyn TransportFactory>,
    connect_timeout: Duration,
    call_timeout: Duration,
    /// 每服务器一个单飞 cell；取走 cell 即断开
    sessions: Mutex<HashMap<String, Arc<OnceCell<ConnectedSession>>>>,
}

impl ConnectionManager {
    pub fn new(
        registry: HashMap<String, ServerConfig>,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self::with_factory(registry, Box::new(StdioTransportFactory), connect_timeout, call_timeout)
    }

    pub fn with_factory(
        registry: HashMap<String, ServerConfig>,
        factory: Box<dyn TransportFactory>,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            connect_timeout,
            call_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 连接指定服务器（幂等）。已连接则直接返回；并发调用共享同一次握手。
    pub async fn connect(&self, server_name: &str) -> Result<(), AgentError> {
        let config = self
            .registry
            .get(server_name)
            .ok_or_else(|| AgentError::Connection {
                server: server_name.to_string(),
                cause: format!(
                    "unknown server (registered: {:?})",
                    self.registry.keys().collect::<Vec<_>>()
                ),
            })?
            .clone();

        let cell = {
            let mut map = self.sessions.lock().expect("sessions lock poisoned");
            map.entry(server_name.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_try_init(|| self.handshake(server_name, &config))
            .await?;
        Ok(())
    }

    /// 建立传输并执行握手：initialize -> tools/list；整体受 connect_timeout 约束
    async fn handshake(
        &self,
        server_name: &str,
        config: &ServerConfig,
    ) -> Result<ConnectedSession, AgentError> {
        let conn_err = |cause: String| AgentError::Connection {
            server: server_name.to_string(),
            cause,
        };

        let outcome = timeout(self.connect_timeout, async {
            let transport = self.factory.create(server_name, config).await?;
            let session = Arc::new(Session::start(server_name, transport));

            let init_params = serde_json::json!({
                "protocol_version": PROTOCOL_VERSION,
                "client_name": "forager",
                "client_version": env!("CARGO_PKG_VERSION"),
            });
            let init_raw = session.request(METHOD_INITIALIZE, Some(init_params)).await?;
            let init: InitializeResult = serde_json::from_value(init_raw)
                .map_err(|e| format!("bad initialize result: {e}"))?;
            tracing::debug!(
                server = %server_name,
                remote = %init.server_name,
                "handshake initialize ok"
            );

            let tools_raw = session.request(METHOD_LIST_TOOLS, None).await?;
            let tools: ListToolsResult = serde_json::from_value(tools_raw)
                .map_err(|e| format!("bad tools/list result: {e}"))?;

            let capabilities: Vec<ToolCapability> = tools
                .tools
                .into_iter()
                .map(|decl| ToolCapability {
                    server: server_name.to_string(),
                    name: decl.name,
                    description: decl.description,
                    input_schema: decl.input_schema,
                    output_schema: decl.output_schema,
                })
                .collect();

            tracing::info!(
                server = %server_name,
                tools = capabilities.len(),
                "connected"
            );
            Ok::<_, String>(ConnectedSession {
                session,
                capabilities: Arc::new(capabilities),
            })
        })
        .await;

        match outcome {
            Ok(Ok(connected)) => Ok(connected),
            Ok(Err(cause)) => Err(conn_err(cause)),
            Err(_) => Err(conn_err(format!(
                "handshake timed out after {:?}",
                self.connect_timeout
            ))),
        }
    }

    /// 断开指定服务器；未连接时为 no-op，拆除错误只记日志
    pub async fn disconnect(&self, server_name: &str) {
        let cell = {
            let mut map = self.sessions.lock().expect("sessions lock poisoned");
            map.remove(server_name)
        };
        if let Some(cell) = cell {
            if let Some(connected) = cell.get() {
                connected.session.close().await;
                tracing::info!(server = %server_name, "disconnected");
            }
        }
    }

    /// 断开全部服务器：全量、幂等；单个拆除失败不影响其余
    pub async fn disconnect_all(&self) {
        let cells: Vec<(String, Arc<OnceCell<ConnectedSession>>)> = {
            let mut map = self.sessions.lock().expect("sessions lock poisoned");
            map.drain().collect()
        };
        for (name, cell) in cells {
            if let Some(connected) = cell.get() {
                connected.session.close().await;
                tracing::info!(server = %name, "disconnected");
            }
        }
    }

    /// 调用指定服务器的工具；所有工具调用都走这里，统一施加 call_timeout
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, AgentError> {
        let connected = self
            .connected(server_name)
            .ok_or_else(|| AgentError::NotConnected(server_name.to_string()))?;

        let params = CallToolParams {
            name: tool_name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(params).map_err(|e| AgentError::ToolExecution {
            server: server_name.to_string(),
            tool: tool_name.to_string(),
            cause: format!("encode failed: {e}"),
        })?;

        let exec_err = |cause: String| AgentError::ToolExecution {
            server: server_name.to_string(),
            tool: tool_name.to_string(),
            cause,
        };

        let raw = match timeout(
            self.call_timeout,
            connected.session.request(METHOD_CALL_TOOL, Some(params)),
        )
        .await
        {
            Ok(Ok(v)) => v,
            Ok(Err(cause)) => return Err(exec_err(cause)),
            Err(_) => {
                return Err(exec_err(format!(
                    "call timed out after {:?}",
                    self.call_timeout
                )))
            }
        };

        let result: CallToolResult =
            serde_json::from_value(raw).map_err(|e| exec_err(format!("bad call result: {e}")))?;
        Ok(ToolOutput {
            payload: result.content,
            is_error: result.is_error,
        })
    }

    /// 聚合一个或全部已连接服务器的能力缓存（不发起远程往返）
    pub fn list_capabilities(&self, server_name: Option<&str>) -> Vec<ToolCapability> {
        let map = self.sessions.lock().expect("sessions lock poisoned");
        map.iter()
            .filter(|(name, _)| server_name.map(|s| s == name.as_str()).unwrap_or(true))
            .filter_map(|(_, cell)| cell.get())
            .flat_map(|c| c.capabilities.iter().cloned())
            .collect()
    }

    /// 已完成握手的服务器名
    pub fn connected_servers(&self) -> Vec<String> {
        let map = self.sessions.lock().expect("sessions lock poisoned");
        map.iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_connected(&self, server_name: &str) -> bool {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(server_name)
            .map(|cell| cell.get().is_some())
            .unwrap_or(false)
    }

    /// 已注册（配置中声明）的服务器名
    pub fn registered_servers(&self) -> Vec<String> {
        self.registry.keys().cloned().collect()
    }

    fn connected(&self, server_name: &str) -> Option<ConnectedSession> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(server_name)
            .and_then(|cell| cell.get())
            .cloned()
    }
}
