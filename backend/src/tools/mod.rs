//! Built-in MCP request handler serving the Kubernetes tool catalog.

pub mod catalog;

use async_trait::async_trait;
use kube_mcp_types::jsonrpc::{INVALID_PARAMS, METHOD_NOT_FOUND};
use kube_mcp_types::protocol::{
    negotiate_protocol_version, INITIALIZE, NOTIFICATION_CANCELLED, NOTIFICATION_INITIALIZED,
    NOTIFICATION_MESSAGE, PING, TOOLS_CALL, TOOLS_LIST,
};
use kube_mcp_types::{
    CallToolParams, CallToolResult, Content, Implementation, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, Tool,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mcp::{HandlerFactory, RequestContext, RequestHandler};
use catalog::ToolError;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "mcp-kubernetes-server";

/// MCP handler with the lifecycle methods and the tool catalog.
pub struct ToolServer {
    server_info: Implementation,
    tools: Vec<Tool>,
}

impl ToolServer {
    pub fn new() -> Self {
        Self {
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            tools: catalog::tools(),
        }
    }

    /// Factory producing a fresh `ToolServer` per session or request.
    pub fn factory() -> HandlerFactory {
        Arc::new(|| Arc::new(ToolServer::new()) as Arc<dyn RequestHandler>)
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Handle the initialize request.
    fn handle_initialize(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => {
                return JsonRpcResponse::error(Some(id), INVALID_PARAMS, "Missing initialize params")
            }
            Err(e) => {
                return JsonRpcResponse::error(
                    Some(id),
                    INVALID_PARAMS,
                    format!("Invalid initialize params: {}", e),
                )
            }
        };

        info!(
            "MCP: Initializing for {} {} (protocol {})",
            params.client_info.name, params.client_info.version, params.protocol_version
        );

        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&params.protocol_version).to_string(),
            capabilities: json!({
                "tools": {},
                "logging": {}
            }),
            server_info: self.server_info.clone(),
            instructions: None,
        };
        to_response(id, &result)
    }

    /// Handle the tools/list request.
    fn handle_list_tools(&self, id: RequestId) -> JsonRpcResponse {
        let result = ListToolsResult {
            tools: self.tools.clone(),
        };
        to_response(id, &result)
    }

    /// Handle a tools/call request.
    fn handle_call_tool(
        &self,
        id: RequestId,
        params: Option<Value>,
        ctx: &RequestContext,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    Some(id),
                    INVALID_PARAMS,
                    format!("Invalid tool call params: {}", e),
                )
            }
            None => return JsonRpcResponse::error(Some(id), INVALID_PARAMS, "Missing tool name"),
        };

        if !self.tools.iter().any(|tool| tool.name == params.name) {
            warn!("MCP: Unknown tool: {}", params.name);
            return JsonRpcResponse::error(
                Some(id),
                INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            );
        }

        ctx.notifier().notify(JsonRpcNotification::new(
            NOTIFICATION_MESSAGE,
            Some(json!({
                "level": "info",
                "logger": SERVER_NAME,
                "data": format!("Running tool {}", params.name)
            })),
        ));

        let result = match catalog::call(&params.name, params.arguments.unwrap_or(Value::Null)) {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(e @ ToolError::InvalidArguments { .. }) => CallToolResult::error(e.to_string()),
            Err(ToolError::UnknownTool(name)) => {
                return JsonRpcResponse::error(
                    Some(id),
                    INVALID_PARAMS,
                    format!("Unknown tool: {}", name),
                )
            }
        };
        to_response(id, &result)
    }
}

impl Default for ToolServer {
    fn default() -> Self {
        Self::new()
    }
}

fn to_response<T: serde::Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(
            Some(id),
            kube_mcp_types::jsonrpc::INTERNAL_ERROR,
            format!("Failed to encode result: {}", e),
        ),
    }
}

#[async_trait]
impl RequestHandler for ToolServer {
    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        ctx: RequestContext,
    ) -> anyhow::Result<JsonRpcResponse> {
        debug!(session_id = ?ctx.session_id(), "MCP: Handling method: {}", request.method);
        let id = request.id;

        let response = match request.method.as_str() {
            INITIALIZE => self.handle_initialize(id, request.params),
            PING => JsonRpcResponse::success(id, json!({})),
            TOOLS_LIST => self.handle_list_tools(id),
            TOOLS_CALL => self.handle_call_tool(id, request.params, &ctx),
            _ => JsonRpcResponse::error(
                Some(id),
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Ok(response)
    }

    async fn handle_notification(
        &self,
        notification: JsonRpcNotification,
        ctx: RequestContext,
    ) -> anyhow::Result<()> {
        match notification.method.as_str() {
            NOTIFICATION_INITIALIZED => {
                debug!(session_id = ?ctx.session_id(), "MCP: Client initialized")
            }
            NOTIFICATION_CANCELLED => debug!("MCP: Client cancelled a request"),
            other => debug!("MCP: Ignoring notification {}", other),
        }
        Ok(())
    }
}
