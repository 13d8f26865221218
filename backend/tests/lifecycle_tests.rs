//! End-to-end session lifecycle over a real TCP listener.

use kube_mcp::{config::TransportConfig, create_app, mcp::SESSION_ID_HEADER, state::AppState};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

const ACCEPT: &str = "application/json, text/event-stream";

async fn spawn_server() -> (SocketAddr, AppState) {
    let state = AppState::with_tool_server(TransportConfig {
        sse_keep_alive_secs: None,
        ..TransportConfig::default()
    });
    let app = create_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

/// Parse a body holding exactly one `data:` frame.
fn parse_frame(text: &str) -> Value {
    let data = text
        .strip_prefix("data: ")
        .unwrap_or_else(|| panic!("not an SSE frame: {:?}", text));
    serde_json::from_str(data.trim_end()).unwrap()
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (addr, state) = spawn_server().await;
    let url = format!("http://{}/mcp", addr);
    let client = Client::new();

    // 1. Initialize
    let response = client
        .post(&url)
        .header("accept", ACCEPT)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "lifecycle-test", "version": "1.0.0" }
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = response
        .headers()
        .get(SESSION_ID_HEADER)
        .expect("session id header")
        .to_str()
        .unwrap()
        .to_string();
    let init = parse_frame(&response.text().await.unwrap());
    assert_eq!(init["result"]["serverInfo"]["name"], "mcp-kubernetes-server");

    // 2. Open the push channel
    let mut stream = client
        .get(&url)
        .header("accept", "text/event-stream")
        .header(SESSION_ID_HEADER, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    assert_eq!(stream.headers()["content-type"], "text/event-stream");

    // 3. List tools; the answer arrives inline as one SSE frame
    let response = client
        .post(&url)
        .header("accept", ACCEPT)
        .header(SESSION_ID_HEADER, &session)
        .json(&json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = parse_frame(&response.text().await.unwrap());
    assert_eq!(listed["id"], 2);
    assert_eq!(listed["result"]["tools"].as_array().unwrap().len(), 6);

    // 4. Calling a tool pushes a log notification over the stream
    let response = client
        .post(&url)
        .header("accept", ACCEPT)
        .header(SESSION_ID_HEADER, &session)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "scale-deployment", "arguments": { "name": "web", "replicas": 3 } }
        }))
        .send()
        .await
        .unwrap();
    let called = parse_frame(&response.text().await.unwrap());
    assert_eq!(called["result"]["content"][0]["text"], "Scaled web to 3 replicas");

    let chunk = tokio::time::timeout(Duration::from_secs(5), stream.chunk())
        .await
        .expect("push notification")
        .unwrap()
        .expect("stream still open");
    let pushed = parse_frame(std::str::from_utf8(&chunk).unwrap());
    assert_eq!(pushed["method"], "notifications/message");

    // 5. Terminate
    let response = client
        .delete(&url)
        .header(SESSION_ID_HEADER, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.sessions().is_empty());

    // The push channel ends with the session
    let end = tokio::time::timeout(Duration::from_secs(5), stream.chunk())
        .await
        .expect("stream should end")
        .unwrap();
    assert!(end.is_none());

    // 6. The session is gone
    let response = client
        .post(&url)
        .header("accept", ACCEPT)
        .header(SESSION_ID_HEADER, &session)
        .json(&json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/list" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32000);
}
