//! MCP endpoint handlers for stateless mode.
//!
//! Every POST gets its own transport and handler; nothing survives the
//! exchange and no session id is issued or honored.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::mcp::{negotiate_format, respond};
use crate::mcp::{McpError, Transport};
use crate::state::AppState;

/// Closes the per-request transport however the exchange ends, including
/// when the client goes away and the handler future is dropped.
struct TeardownGuard(Arc<Transport>);

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// POST /mcp - Handle one JSON-RPC message on a throwaway transport.
pub async fn stateless_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, McpError> {
    let format = negotiate_format(&headers, state.config().json_response)?;

    let transport = Arc::new(Transport::stateless());
    let _teardown = TeardownGuard(transport.clone());
    transport.bind(state.new_handler())?;

    let inbound = transport.handle_inbound(&body).await?;
    debug!("MCP: Stateless exchange complete");
    respond(inbound, format, None)
}

/// GET and DELETE /mcp - there is no session to stream from or terminate.
pub async fn method_not_allowed() -> McpError {
    McpError::MethodNotAllowed
}
