//! 工具协议线上类型
//!
//! 行分隔 JSON-RPC 2.0：请求 {jsonrpc, id, method, params}，响应 {jsonrpc, id, result | error}。
//! 方法集：initialize（握手）、tools/list（能力发现）、tools/call（调用）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2025-03-26";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_LIST_TOOLS: &str = "tools/list";
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// JSON-RPC 请求封包
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 响应封包
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// initialize 握手结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_name: String,
    #[serde(default)]
    pub server_version: String,
}

/// tools/list 结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDecl>,
}

/// 服务器声明的单个工具（线上形态，未绑定服务器名）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDecl {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema；缺省为接受任意对象
    #[serde(default = "default_object_schema")]
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

fn default_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// tools/call 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

/// tools/call 结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

/// 一个已连接服务器暴露的可调用操作元数据
///
/// 每次 connect 握手后整体重建；活的服务器才是权威来源，本结构不持久化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCapability {
    pub server: String,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
}

impl ToolCapability {
    /// "server/tool" 限定名
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.server, self.name)
    }
}

/// 工具调用的规范化结果（ConnectionManager::call_tool 的返回值）
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub payload: Value,
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_null_params() {
        let req = JsonRpcRequest::new(1, METHOD_LIST_TOOLS, None);
        let s = serde_json::to_string(&req).unwrap();
        assert!(!s.contains("params"));
        assert!(s.contains("\"jsonrpc\":\"2.0\""));
    }

    #[test]
    fn tool_decl_defaults_input_schema() {
        let decl: ToolDecl = serde_json::from_str(r#"{"name": "add"}"#).unwrap();
        assert_eq!(decl.input_schema, serde_json::json!({"type": "object"}));
    }

    #[test]
    fn qualified_name_joins_server_and_tool() {
        let cap = ToolCapability {
            server: "local-math".into(),
            name: "add".into(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
        };
        assert_eq!(cap.qualified_name(), "local-math/add");
    }
}
