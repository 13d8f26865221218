//! MCP Streamable HTTP endpoint handlers (stateful mode).
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send JSON-RPC messages (answered as JSON or one SSE frame)
//! - `GET /mcp` - Open the session's SSE push channel
//! - `DELETE /mcp` - Terminate a session

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use kube_mcp_types::{JsonRpcMessage, JsonRpcResponse};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::mcp::codec::{self, EVENT_STREAM_MIME_TYPE, JSON_MIME_TYPE};
use crate::mcp::{Inbound, McpError, Session, SessionId, Transport, SESSION_ID_HEADER};
use crate::state::AppState;

/// How a POST answer is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    EventStream,
}

/// Media ranges the client accepts. A missing header accepts anything.
struct Accept {
    json: bool,
    event_stream: bool,
}

impl Accept {
    fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
        else {
            return Self {
                json: true,
                event_stream: true,
            };
        };

        let mut accept = Self {
            json: false,
            event_stream: false,
        };
        for range in value.split(',') {
            let media = range.split(';').next().unwrap_or("").trim();
            match media.to_ascii_lowercase().as_str() {
                "*/*" => {
                    accept.json = true;
                    accept.event_stream = true;
                }
                "application/json" | "application/*" => accept.json = true,
                "text/event-stream" | "text/*" => accept.event_stream = true,
                _ => {}
            }
        }
        accept
    }
}

/// Pick the POST response representation.
///
/// SSE is the default; JSON is used when configured or when it is all the
/// client takes.
pub fn negotiate_format(headers: &HeaderMap, json_response: bool) -> Result<ResponseFormat, McpError> {
    let accept = Accept::from_headers(headers);
    match (accept.json, accept.event_stream) {
        (false, false) => Err(McpError::NotAcceptable(
            "client must accept application/json or text/event-stream",
        )),
        (true, _) if json_response => Ok(ResponseFormat::Json),
        (_, true) => Ok(ResponseFormat::EventStream),
        (true, false) => Ok(ResponseFormat::Json),
    }
}

/// Extract session ID from headers.
fn get_session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
}

/// Header value carrying a session id back to the client.
fn session_header(id: &SessionId) -> Result<HeaderValue, McpError> {
    HeaderValue::from_str(id.as_str())
        .map_err(|e| McpError::Internal(format!("session id {:?} is not a valid header: {}", id.as_str(), e)))
}

/// Resolve the session named by the request, or fail with `UnknownSession`.
fn session_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Arc<Session>, McpError> {
    let id = get_session_id(headers).ok_or(McpError::UnknownSession)?;
    state.sessions().lookup(id).ok_or_else(|| {
        debug!(session_id = %id, "MCP: Unknown session");
        McpError::UnknownSession
    })
}

/// Encode one correlated response in the negotiated representation.
pub fn reply(
    response: JsonRpcResponse,
    format: ResponseFormat,
    session_id: Option<&SessionId>,
) -> Result<Response, McpError> {
    let message = JsonRpcMessage::Response(response);
    let mut builder = Response::builder().status(StatusCode::OK);
    let body = match format {
        ResponseFormat::Json => {
            builder = builder.header(header::CONTENT_TYPE, JSON_MIME_TYPE);
            codec::encode(&message)?
        }
        ResponseFormat::EventStream => {
            builder = builder
                .header(header::CONTENT_TYPE, EVENT_STREAM_MIME_TYPE)
                .header(header::CACHE_CONTROL, "no-cache");
            codec::encode_event_frame(&message)?
        }
    };
    if let Some(id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, session_header(id)?);
    }
    builder
        .body(Body::from(body))
        .map_err(|e| McpError::Internal(format!("failed to build response: {}", e)))
}

/// `202 Accepted` for notifications and client responses.
pub fn accepted(session_id: Option<&SessionId>) -> Result<Response, McpError> {
    let mut response = StatusCode::ACCEPTED.into_response();
    if let Some(id) = session_id {
        response
            .headers_mut()
            .insert(SESSION_ID_HEADER, session_header(id)?);
    }
    Ok(response)
}

/// Turn a transport outcome into an HTTP response.
pub fn respond(
    inbound: Inbound,
    format: ResponseFormat,
    session_id: Option<&SessionId>,
) -> Result<Response, McpError> {
    match inbound {
        Inbound::Reply(response) => reply(response, format, session_id),
        Inbound::Initialized { response, .. } => reply(response, format, session_id),
        Inbound::Accepted => accepted(session_id),
    }
}

/// POST /mcp - Handle JSON-RPC messages.
///
/// Without a session header only an `initialize` request is accepted; it
/// creates the session and the `mcp-session-id` response header carries its id.
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, McpError> {
    let json_response = state.config().json_response;

    if headers.contains_key(SESSION_ID_HEADER) {
        let session = session_from_headers(&state, &headers)?;
        let format = negotiate_format(&headers, json_response)?;
        let inbound = session.transport().handle_inbound(&body).await?;
        return respond(inbound, format, Some(session.id()));
    }

    // No session yet: this must be the initialize handshake.
    let message = match codec::decode(&body) {
        Ok(JsonRpcMessage::Request(request)) if request.is_initialize() => request,
        _ => return Err(McpError::UnknownSession),
    };
    let format = negotiate_format(&headers, json_response)?;

    let transport = Arc::new(Transport::stateful(state.id_generator()));
    transport.bind(state.new_handler())?;

    let outcome = transport.dispatch(message.into()).await;
    let result = match outcome {
        Ok(Inbound::Initialized {
            session_id: Some(session_id),
            response,
        }) => reply(response, format, Some(&session_id)).and_then(|http_response| {
            // Register only after the reply carrying the id is built.
            let session = state
                .sessions()
                .create(Session::new(session_id, transport.clone()))?;
            state.sessions().evict_on_close(&session);
            info!(session_id = %session.id(), "MCP: New session initialized");
            Ok(http_response)
        }),
        Ok(other) => {
            // Handshake refused by the handler; nothing to keep.
            transport.close();
            respond(other, format, None)
        }
        Err(e) => Err(e),
    };
    if result.is_err() {
        transport.close();
    }
    result
}

/// GET /mcp - Open SSE stream for server-initiated messages.
///
/// At most one stream per session; dropping it closes the session.
pub async fn mcp_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, McpError> {
    let session = session_from_headers(&state, &headers)?;

    if !Accept::from_headers(&headers).event_stream {
        return Err(McpError::NotAcceptable(
            "client must accept text/event-stream",
        ));
    }

    let session_id = session_header(session.id())?;
    let channel = session.transport().open_push_channel()?;
    info!(session_id = %session.id(), "MCP: SSE stream opened");

    let events = channel
        .into_stream()
        .filter_map(|message| match Event::default().json_data(&message) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                warn!("MCP: Dropping push message: {}", e);
                None
            }
        });

    let sse = Sse::new(events);
    let mut response = match state.config().keep_alive() {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval).text("keep-alive"))
            .into_response(),
        None => sse.into_response(),
    };
    let response_headers = response.headers_mut();
    response_headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response_headers.insert(SESSION_ID_HEADER, session_id);
    Ok(response)
}

/// DELETE /mcp - Terminate a session.
pub async fn mcp_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, McpError> {
    let session = session_from_headers(&state, &headers)?;
    session.transport().close();
    state.sessions().remove(session.id());
    info!(session_id = %session.id(), "MCP: Session terminated by client");
    Ok(StatusCode::OK)
}
