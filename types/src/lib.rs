//! Shared types for the kube-mcp server.
//!
//! This crate contains the JSON-RPC 2.0 envelope and the MCP payload types
//! exchanged between clients and the backend transport.

/// Default port for the kube-mcp server.
pub const DEFAULT_PORT: u16 = 3000;

/// Default host the server binds to.
pub const DEFAULT_HOST: &str = "localhost";

/// Path of the Streamable HTTP endpoint.
pub const MCP_ENDPOINT: &str = "/mcp";

pub mod jsonrpc;
pub mod protocol;

// Re-export commonly used types
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use protocol::{
    CallToolParams, CallToolResult, Content, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, Tool,
};
