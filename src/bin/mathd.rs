//! mathd：演示用 stdio 工具服务器（add / sqrt）
//!
//! 在 [servers.local-math] 里配置 command = "mathd" 即可被 forager 连接。
//! 协议：行分隔 JSON-RPC，方法 initialize / tools/list / tools/call。

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use forager::mcp::types::{
    JsonRpcRequest, METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_LIST_TOOLS, PROTOCOL_VERSION,
};

fn tools() -> Value {
    json!({
        "tools": [
            {
                "name": "add",
                "description": "Add two numbers",
                "input_schema": {
                    "type": "object",
                    "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                    "required": ["a", "b"]
                }
            },
            {
                "name": "sqrt",
                "description": "Square root of a number",
                "input_schema": {
                    "type": "object",
                    "properties": {"number": {"type": "number", "minimum": 0}},
                    "required": ["number"]
                }
            }
        ]
    })
}

fn handle(request: &JsonRpcRequest) -> Value {
    let respond = |result: Value| {
        json!({"jsonrpc": "2.0", "id": request.id, "result": result})
    };
    let respond_err = |code: i64, message: &str| {
        json!({"jsonrpc": "2.0", "id": request.id, "error": {"code": code, "message": message}})
    };

    match request.method.as_str() {
        METHOD_INITIALIZE => respond(json!({
            "protocol_version": PROTOCOL_VERSION,
            "server_name": "mathd",
            "server_version": env!("CARGO_PKG_VERSION"),
        })),
        METHOD_LIST_TOOLS => respond(tools()),
        METHOD_CALL_TOOL => {
            let params = request.params.clone().unwrap_or(Value::Null);
            let name = params["name"].as_str().unwrap_or("");
            let args = &params["arguments"];
            match name {
                "add" => match (args["a"].as_f64(), args["b"].as_f64()) {
                    (Some(a), Some(b)) => {
                        respond(json!({"content": a + b, "is_error": false}))
                    }
                    _ => respond(json!({"content": "a and b must be numbers", "is_error": true})),
                },
                "sqrt" => match args["number"].as_f64() {
                    Some(n) if n >= 0.0 => {
                        respond(json!({"content": n.sqrt(), "is_error": false}))
                    }
                    Some(_) => respond(json!({"content": "negative input", "is_error": true})),
                    None => respond(json!({"content": "number required", "is_error": true})),
                },
                other => respond_err(-32601, &format!("unknown tool: {other}")),
            }
        }
        other => respond_err(-32601, &format!("unknown method: {other}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => handle(&request),
            Err(e) => json!({
                "jsonrpc": "2.0", "id": 0,
                "error": {"code": -32700, "message": format!("parse error: {e}")}
            }),
        };
        stdout.write_all(reply.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
