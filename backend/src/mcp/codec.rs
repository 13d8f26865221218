//! JSON-RPC message codec.
//!
//! Converts between raw HTTP bodies, JSON-RPC envelopes and Server-Sent-Event
//! frames (`data: <json>\n\n`).

use axum::body::Bytes;
use kube_mcp_types::jsonrpc::{JsonRpcMessage, JSONRPC_VERSION};
use serde_json::{Map, Value};

use super::error::McpError;

/// MIME type of plain JSON bodies.
pub const JSON_MIME_TYPE: &str = "application/json";

/// MIME type of Server-Sent-Event streams.
pub const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";

/// Decode a request body into a single JSON-RPC envelope.
pub fn decode(body: &[u8]) -> Result<JsonRpcMessage, McpError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| McpError::MalformedMessage(format!("invalid JSON: {}", e)))?;

    let object = match value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(McpError::MalformedMessage(
                "batch messages are not supported".to_string(),
            ))
        }
        _ => {
            return Err(McpError::MalformedMessage(
                "expected a JSON-RPC object".to_string(),
            ))
        }
    };

    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(McpError::MalformedMessage(format!(
                "unsupported jsonrpc version: {}",
                other
            )))
        }
        None => {
            return Err(McpError::MalformedMessage(
                "missing jsonrpc version tag".to_string(),
            ))
        }
    }

    let shape = classify(&object)?;
    let value = Value::Object(object);
    let message = match shape {
        Shape::Request => serde_json::from_value(value).map(JsonRpcMessage::Request),
        Shape::Notification => serde_json::from_value(value).map(JsonRpcMessage::Notification),
        Shape::Response => serde_json::from_value(value).map(JsonRpcMessage::Response),
    };
    message.map_err(|e| McpError::MalformedMessage(e.to_string()))
}

enum Shape {
    Request,
    Notification,
    Response,
}

fn classify(object: &Map<String, Value>) -> Result<Shape, McpError> {
    let has_id = object.get("id").is_some_and(|id| !id.is_null());
    let has_method = object.contains_key("method");
    let has_outcome = object.contains_key("result") || object.contains_key("error");

    match (has_method, has_id, has_outcome) {
        (true, true, _) => Ok(Shape::Request),
        (true, false, _) => Ok(Shape::Notification),
        (false, _, true) => Ok(Shape::Response),
        (false, _, false) => Err(McpError::MalformedMessage(
            "message has neither a method nor a result".to_string(),
        )),
    }
}

/// Encode an envelope as a JSON body.
pub fn encode(message: &JsonRpcMessage) -> Result<Bytes, McpError> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| McpError::Internal(format!("failed to encode message: {}", e)))
}

/// Encode an envelope as one SSE `data:` frame.
pub fn encode_event_frame(message: &JsonRpcMessage) -> Result<Bytes, McpError> {
    let json = encode(message)?;
    let mut frame = Vec::with_capacity(json.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");
    Ok(Bytes::from(frame))
}
