//! MCP (Model Context Protocol) Streamable HTTP transport.
//!
//! This module carries JSON-RPC messages between HTTP and a long-lived
//! request handler, either per session (stateful) or per request (stateless).
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send JSON-RPC requests, notifications and responses
//! - `GET /mcp` - Open the session's SSE push channel
//! - `DELETE /mcp` - Terminate session
//!
//! ## Session Management
//!
//! Sessions are identified by the `mcp-session-id` header, assigned during
//! initialization and required for subsequent requests.

pub mod codec;
pub mod error;
pub mod handler;
pub mod session;
pub mod transport;

pub use error::McpError;
pub use handler::{HandlerFactory, RequestContext, RequestHandler};
pub use session::{random_session_ids, Session, SessionId, SessionIdGenerator, SessionRegistry};
pub use transport::{Inbound, Notifier, PushChannel, Transport};

/// Header carrying the session identifier in both directions.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";
