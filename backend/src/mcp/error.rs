//! Transport error taxonomy and its HTTP mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kube_mcp_types::jsonrpc::{
    JsonRpcResponse, INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR, SERVER_ERROR,
};
use thiserror::Error;
use tracing::error;

use super::session::SessionId;

/// Errors raised while routing a message between HTTP and a handler.
///
/// Every variant resolves to a well-formed JSON-RPC error envelope on the
/// request that caused it; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("no valid session")]
    UnknownSession,

    #[error("transport closed")]
    Closed,

    #[error("transport is already bound to a handler")]
    AlreadyBound,

    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    #[error("server already initialized")]
    AlreadyInitialized,

    #[error("a push channel is already open for this session")]
    PushChannelBusy,

    #[error("not acceptable: {0}")]
    NotAcceptable(&'static str),

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// HTTP status this error is surfaced with.
    pub fn status(&self) -> StatusCode {
        match self {
            McpError::MalformedMessage(_)
            | McpError::UnknownSession
            | McpError::Closed
            | McpError::AlreadyInitialized => StatusCode::BAD_REQUEST,
            McpError::PushChannelBusy => StatusCode::CONFLICT,
            McpError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            McpError::HostNotAllowed(_) | McpError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            McpError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            McpError::AlreadyBound | McpError::DuplicateSession(_) | McpError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON-RPC error code carried in the envelope.
    pub fn code(&self) -> i32 {
        match self {
            McpError::MalformedMessage(_) => PARSE_ERROR,
            McpError::AlreadyInitialized => INVALID_REQUEST,
            McpError::AlreadyBound | McpError::DuplicateSession(_) | McpError::Internal(_) => {
                INTERNAL_ERROR
            }
            _ => SERVER_ERROR,
        }
    }

    /// Client-facing message. Unknown and torn-down sessions share one text.
    fn client_message(&self) -> String {
        match self {
            McpError::MalformedMessage(reason) => format!("Parse error: {}", reason),
            McpError::UnknownSession | McpError::Closed => {
                "Bad Request: No valid session ID provided".to_string()
            }
            McpError::AlreadyInitialized => "Invalid Request: Server already initialized".to_string(),
            McpError::PushChannelBusy => {
                "Conflict: Only one SSE stream is allowed per session".to_string()
            }
            McpError::NotAcceptable(reason) => format!("Not Acceptable: {}", reason),
            McpError::HostNotAllowed(host) => format!("Invalid Host header: {}", host),
            McpError::OriginNotAllowed(origin) => format!("Invalid Origin header: {}", origin),
            McpError::MethodNotAllowed => "Method not allowed.".to_string(),
            McpError::AlreadyBound | McpError::DuplicateSession(_) | McpError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<anyhow::Error> for McpError {
    fn from(err: anyhow::Error) -> Self {
        McpError::Internal(format!("{:#}", err))
    }
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("MCP: {}", self);
        }

        let body = JsonRpcResponse::error(None, self.code(), self.client_message());
        let mut response = (status, Json(body)).into_response();
        if matches!(self, McpError::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}
