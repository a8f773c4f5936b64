//! 工具服务器连接管理
//!
//! - **types**: 线上协议类型（JSON-RPC 封包、握手与能力元数据）
//! - **transport**: 行分隔 JSON 传输（stdio 子进程）
//! - **session**: 每服务器一个会话 actor，串行化调用
//! - **manager**: 连接生命周期、能力缓存与统一的 call_tool 咽喉

pub mod manager;
pub mod session;
pub mod transport;
pub mod types;

pub use manager::{ConnectionManager, StdioTransportFactory, TransportFactory};
pub use session::Session;
pub use transport::{StdioTransport, Transport};
pub use types::{CallToolResult, ToolCapability, ToolDecl, ToolOutput};
