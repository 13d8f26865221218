//! DNS-rebinding protection for the MCP endpoint.
//!
//! When enabled, requests whose `Host` is not allow-listed are rejected
//! before any session logic runs. Disabled by default.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::mcp::McpError;
use crate::state::AppState;

/// Drop a trailing `:port`, keeping bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// Whether `host` matches an allow-list entry, either verbatim or without
/// its port.
pub fn host_allowed(host: &str, allowed: &[String]) -> bool {
    if host.is_empty() {
        return false;
    }
    let name = strip_port(host);
    allowed
        .iter()
        .any(|entry| entry.eq_ignore_ascii_case(host) || entry.eq_ignore_ascii_case(name))
}

/// Whether `origin` is acceptable. An empty allow-list disables the check,
/// and a request without an Origin header always passes.
pub fn origin_allowed(origin: Option<&str>, allowed: &[String]) -> bool {
    match origin {
        None => true,
        Some(_) if allowed.is_empty() => true,
        Some(origin) => allowed
            .iter()
            .any(|entry| entry.eq_ignore_ascii_case(origin.trim_end_matches('/'))),
    }
}

/// Middleware enforcing the host (and optional origin) allow-lists.
pub async fn host_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let config = state.config();
    if !config.dns_rebinding_protection {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or("");
    if !host_allowed(host, &config.allowed_hosts) {
        warn!("MCP: Rejecting request for host {:?}", host);
        return McpError::HostNotAllowed(host.to_string()).into_response();
    }

    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, &config.allowed_origins) {
        let origin = origin.unwrap_or_default().to_string();
        warn!("MCP: Rejecting request from origin {:?}", origin);
        return McpError::OriginNotAllowed(origin).into_response();
    }

    next.run(request).await
}
