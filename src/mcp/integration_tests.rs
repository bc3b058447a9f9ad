//! End-to-end tests for the MCP server over real sockets.
//!
//! These tests bind TCP ports and talk to the server with `reqwest`:
//! - Health and progress counters through a full agent exchange
//! - Session affinity across requests
//! - Push-then-post transport
//! - Stop/start cycles releasing the port
//! - Idle session sweeping

#![cfg(test)]

use serde_json::{json, Value};

use super::server::{McpConfig, McpServer};
use super::transport::{HealthResponse, SESSION_HEADER};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn health(base: &str) -> HealthResponse {
    client()
        .get(format!("{}/", base))
        .send()
        .await
        .expect("health request")
        .json()
        .await
        .expect("health body")
}

async fn post_mcp(base: &str, session: Option<&str>, body: Value) -> reqwest::Response {
    let mut request = client().post(format!("{}/mcp", base)).json(&body);
    if let Some(id) = session {
        request = request.header(SESSION_HEADER, id);
    }
    request.send().await.expect("mcp request")
}

fn session_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string()
}

// ============================================================================
// Agent flow
// ============================================================================

#[tokio::test]
async fn agent_flow_on_default_port() {
    let server = McpServer::new(McpConfig::default());
    let endpoints = server.start(Some(3777)).await.expect("port 3777 available");
    assert_eq!(endpoints.port, 3777);
    let base = "http://127.0.0.1:3777";

    let before = health(base).await;
    assert_eq!(before.status, "running");
    assert_eq!(before.active_sessions, 0);
    assert_eq!(before.total_progress_events, 0);

    let response = post_mcp(
        base,
        None,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    )
    .await;
    assert_eq!(response.status(), 200);
    let session = session_of(&response);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");

    let response = post_mcp(
        base,
        Some(&session),
        json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {"name": "log_progress", "arguments": {"summary": "fixed bug"}}
        }),
    )
    .await;
    assert_eq!(session_of(&response), session);
    let body: Value = response.json().await.unwrap();
    assert!(body["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("fixed bug"));

    let after = health(base).await;
    assert_eq!(after.total_progress_events, 1);
    assert_eq!(after.active_sessions, 1);

    let log = server.progress_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].summary, "fixed bug");
    assert_eq!(log[0].session_id, session);

    assert!(server.stop().await);
}

#[tokio::test]
async fn listener_sees_each_progress_event_once() {
    let server = McpServer::new(McpConfig::default());
    let endpoints = server.start(Some(0)).await.unwrap();
    let base = format!("http://127.0.0.1:{}", endpoints.port);

    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = server.subscribe(move |event| sink.lock().push(event.summary.clone()));

    for summary in ["one", "two"] {
        post_mcp(
            &base,
            None,
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": {"name": "log_progress", "arguments": {"summary": summary}}
            }),
        )
        .await;
    }

    assert_eq!(*seen.lock(), vec!["one".to_string(), "two".to_string()]);
    server.stop().await;
}

// ============================================================================
// Transports
// ============================================================================

#[tokio::test]
async fn push_then_post_transport() {
    let server = McpServer::new(McpConfig::default());
    let endpoints = server.start(Some(0)).await.unwrap();
    let base = format!("http://127.0.0.1:{}", endpoints.port);

    let mut stream = client()
        .get(format!("{}/sse", base))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), 200);

    let chunk = stream.chunk().await.unwrap().expect("endpoint event");
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains("event: endpoint"));
    let path = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap()
        .to_string();

    let response = client()
        .post(format!("{}{}", base, path))
        .json(&json!({"jsonrpc": "2.0", "id": 11, "method": "tools/list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    let chunk = stream.chunk().await.unwrap().expect("message event");
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains("event: message"));
    assert!(text.contains("log_progress"));

    assert_eq!(health(&base).await.active_sessions, 1);
    server.stop().await;
}

#[tokio::test]
async fn stop_closes_streams_and_releases_port() {
    let server = McpServer::new(McpConfig::default());
    let endpoints = server.start(Some(0)).await.unwrap();
    let base = format!("http://127.0.0.1:{}", endpoints.port);

    let mut stream = client()
        .get(format!("{}/sse", base))
        .send()
        .await
        .unwrap();
    stream.chunk().await.unwrap();

    assert!(server.stop().await);
    assert!(!server.stop().await);

    // The push stream ends instead of hanging.
    let rest = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while let Ok(Some(_)) = stream.chunk().await {}
    })
    .await;
    assert!(rest.is_ok());

    // Same port can be bound again.
    let again = server.start(Some(endpoints.port)).await.unwrap();
    assert_eq!(again.port, endpoints.port);
    assert_eq!(health(&base).await.active_sessions, 0);
    server.stop().await;
}

#[tokio::test]
async fn abandoned_sessions_are_swept() {
    let server = McpServer::new(McpConfig {
        session_idle: std::time::Duration::from_millis(100),
        ..McpConfig::default()
    });
    let endpoints = server.start(Some(0)).await.unwrap();
    let base = format!("http://127.0.0.1:{}", endpoints.port);

    let response = post_mcp(
        &base,
        None,
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
    )
    .await;
    assert_eq!(response.status(), 200);
    assert_eq!(health(&base).await.active_sessions, 1);

    let swept = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while health(&base).await.active_sessions > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    })
    .await;
    assert!(swept.is_ok());
    server.stop().await;
}
