//! 测试辅助：内存版工具服务器（不起子进程）
//!
//! StubServer 描述一台服务器的工具集与故障注入开关；StubFactory 作为
//! TransportFactory 注入 ConnectionManager，使连接/调用全部走内存。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use forager::config::{AppConfig, ServerConfig};
use forager::mcp::manager::TransportFactory;
use forager::mcp::types::JsonRpcRequest;
use forager::mcp::{ConnectionManager, Transport};

pub type ToolFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// 一台内存工具服务器的脚本
pub struct StubServer {
    pub name: String,
    tools: Mutex<Vec<(String, Value, ToolFn)>>,
    pub handshake_fails: AtomicBool,
    pub handshake_delay: Mutex<Option<Duration>>,
    pub call_delay: Mutex<Option<Duration>>,
    /// 成功建立的传输数（断言 connect 幂等）
    pub connects: AtomicUsize,
    /// 传输是否已被关闭
    pub closed: Arc<AtomicBool>,
}

impl StubServer {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tools: Mutex::new(Vec::new()),
            handshake_fails: AtomicBool::new(false),
            handshake_delay: Mutex::new(None),
            call_delay: Mutex::new(None),
            connects: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_tool(
        self: Arc<Self>,
        name: &str,
        schema: Value,
        f: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        self.tools
            .lock()
            .unwrap()
            .push((name.to_string(), schema, Arc::new(f)));
        self
    }

    /// 默认的 add 工具（a + b）
    pub fn with_add(self: Arc<Self>) -> Arc<Self> {
        self.with_tool(
            "add",
            json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
            |args| {
                let a = args["a"].as_f64().ok_or("a must be a number")?;
                let b = args["b"].as_f64().ok_or("b must be a number")?;
                Ok(json!(a + b))
            },
        )
    }

    fn tool_list(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .lock()
            .unwrap()
            .iter()
            .map(|(name, schema, _)| {
                json!({"name": name, "description": "", "input_schema": schema})
            })
            .collect();
        json!({"tools": tools})
    }

    fn call(&self, name: &str, args: &Value) -> Value {
        let f = self
            .tools
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, f)| f.clone());
        match f {
            None => json!({"content": format!("unknown tool: {name}"), "is_error": true}),
            Some(f) => match f(args) {
                Ok(content) => json!({"content": content, "is_error": false}),
                Err(e) => json!({"content": e, "is_error": true}),
            },
        }
    }
}

/// 内存传输：send 时直接计算响应入队，recv 弹出（可注入延迟）
pub struct StubTransport {
    server: Arc<StubServer>,
    queue: VecDeque<(Option<Duration>, String)>,
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&mut self, line: &str) -> Result<(), String> {
        let request: JsonRpcRequest =
            serde_json::from_str(line).map_err(|e| format!("bad request: {e}"))?;
        let (delay, result) = match request.method.as_str() {
            "initialize" => (
                *self.server.handshake_delay.lock().unwrap(),
                json!({
                    "protocol_version": "2025-03-26",
                    "server_name": self.server.name,
                    "server_version": "stub",
                }),
            ),
            "tools/list" => (None, self.server.tool_list()),
            "tools/call" => {
                let params = request.params.clone().unwrap_or(Value::Null);
                let name = params["name"].as_str().unwrap_or("");
                (
                    *self.server.call_delay.lock().unwrap(),
                    self.server.call(name, &params["arguments"]),
                )
            }
            other => {
                let reply = json!({
                    "jsonrpc": "2.0", "id": request.id,
                    "error": {"code": -32601, "message": format!("unknown method: {other}")}
                });
                self.queue.push_back((None, reply.to_string()));
                return Ok(());
            }
        };
        let reply = json!({"jsonrpc": "2.0", "id": request.id, "result": result});
        self.queue.push_back((delay, reply.to_string()));
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, String> {
        if self.server.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let Some((delay, line)) = self.queue.pop_front() else {
            return Err("no pending response".to_string());
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        Ok(Some(line))
    }

    async fn close(&mut self) {
        self.server.closed.store(true, Ordering::SeqCst);
    }
}

/// 按服务器名分发内存传输的工厂
pub struct StubFactory {
    servers: HashMap<String, Arc<StubServer>>,
}

#[async_trait]
impl TransportFactory for StubFactory {
    async fn create(
        &self,
        server_name: &str,
        _config: &ServerConfig,
    ) -> Result<Box<dyn Transport>, String> {
        let server = self
            .servers
            .get(server_name)
            .ok_or_else(|| format!("no stub for {server_name}"))?
            .clone();
        if server.handshake_fails.load(Ordering::SeqCst) {
            return Err("stub refuses connection".to_string());
        }
        server.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubTransport {
            server,
            queue: VecDeque::new(),
        }))
    }
}

fn dummy_config(name: &str) -> ServerConfig {
    ServerConfig {
        command: format!("stub-{name}"),
        args: Vec::new(),
        env: HashMap::new(),
        description: String::new(),
    }
}

/// 用内存工厂组装 ConnectionManager
pub fn manager_with(
    servers: &[Arc<StubServer>],
    connect_timeout: Duration,
    call_timeout: Duration,
) -> ConnectionManager {
    let registry: HashMap<String, ServerConfig> = servers
        .iter()
        .map(|s| (s.name.clone(), dummy_config(&s.name)))
        .collect();
    let factory = StubFactory {
        servers: servers.iter().map(|s| (s.name.clone(), s.clone())).collect(),
    };
    ConnectionManager::with_factory(registry, Box::new(factory), connect_timeout, call_timeout)
}

/// Agent 测试用配置：注册 stub 服务器名，设定重试/并发
pub fn test_config(server_names: &[&str], task_retries: u32) -> AppConfig {
    let mut toml = format!(
        "[execution]\ntask_retries = {task_retries}\nmax_concurrent_tasks = 3\n\
         call_timeout_secs = 5\nconnect_timeout_secs = 5\n\n\
         [policy]\ndenied_categories = [\"shell\", \"delete\"]\n"
    );
    for name in server_names {
        toml.push_str(&format!("\n[servers.{name}]\ncommand = \"stub-{name}\"\n"));
    }
    toml::from_str(&toml).unwrap()
}
