//! Transport-independent MCP request handling.
//!
//! Both HTTP transports hand raw request bodies to [`McpHandler`], which parses
//! single or batched JSON-RPC envelopes, dispatches each method, and turns
//! successful `log_progress` calls into [`ProgressEvent`]s on the progress
//! channel.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::protocol::{
    log_progress_descriptor, JsonRpcRequest, JsonRpcResponse, RpcError, LOG_PROGRESS_TOOL,
    PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
};
use crate::bus::EventChannel;

/// One successful `log_progress` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub summary: String,
    /// RFC 3339 / ISO-8601, UTC
    pub timestamp: String,
    pub session_id: String,
}

/// Result of handling one HTTP request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A single response object or a batch array.
    Reply(Value),
    /// Only notifications were received; nothing to send back.
    Accepted,
    /// The body was not valid JSON-RPC at all.
    Malformed(Value),
}

#[derive(Clone)]
pub struct McpHandler {
    progress: Arc<EventChannel<ProgressEvent>>,
}

impl McpHandler {
    pub fn new(progress: Arc<EventChannel<ProgressEvent>>) -> Self {
        Self { progress }
    }

    pub fn progress(&self) -> &Arc<EventChannel<ProgressEvent>> {
        &self.progress
    }

    /// Handle a raw body containing one envelope or a batch.
    pub fn handle_body(&self, body: &[u8], session_id: &str) -> Dispatch {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("[mcp] unparseable body from session {}: {}", session_id, e);
                return Dispatch::Malformed(RpcError::Parse(e.to_string()).into_response().to_value());
            }
        };

        match value {
            Value::Array(items) if items.is_empty() => Dispatch::Malformed(
                RpcError::InvalidRequest("empty batch".to_string())
                    .into_response()
                    .to_value(),
            ),
            Value::Array(items) => {
                let replies: Vec<Value> = items
                    .into_iter()
                    .filter_map(|item| self.handle_value(item, session_id))
                    .map(|reply| reply.to_value())
                    .collect();
                if replies.is_empty() {
                    Dispatch::Accepted
                } else {
                    Dispatch::Reply(Value::Array(replies))
                }
            }
            single => match self.handle_value(single, session_id) {
                Some(reply) => Dispatch::Reply(reply.to_value()),
                None => Dispatch::Accepted,
            },
        }
    }

    fn handle_value(&self, value: Value, session_id: &str) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request, session_id),
            Err(e) => Some(JsonRpcResponse::failure(
                id,
                &RpcError::InvalidRequest(e.to_string()),
            )),
        }
    }

    /// Handle one parsed envelope. Returns `None` for notifications.
    pub fn handle(&self, request: JsonRpcRequest, session_id: &str) -> Option<JsonRpcResponse> {
        if request.method.starts_with("notifications/") {
            tracing::debug!("[mcp] {} from session {}", request.method, session_id);
            return None;
        }

        let outcome = self.dispatch(&request.method, request.params, session_id);

        // Requests without an id still run, but nobody is waiting for the reply.
        let id = request.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::debug!("[mcp] {} failed for session {}: {}", request.method, session_id, e);
                JsonRpcResponse::failure(id, &e)
            }
        })
    }

    fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: &str,
    ) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [log_progress_descriptor()] })),
            "tools/call" => self.call_tool(params.unwrap_or(Value::Null), session_id),
            other => Err(RpcError::MethodNotFound(other.to_string())),
        }
    }

    fn call_tool(&self, params: Value, session_id: &str) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::InvalidArguments("tools/call requires a tool name".into()))?;

        if name != LOG_PROGRESS_TOOL {
            return Err(RpcError::UnknownTool(name.to_string()));
        }

        let summary = params
            .get("arguments")
            .and_then(|args| args.get("summary"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                RpcError::InvalidArguments("'summary' must be a non-empty string".into())
            })?;

        let event = self.record_progress(summary, session_id);
        Ok(json!({
            "content": [{
                "type": "text",
                "text": format!("Progress logged: {}", event.summary)
            }]
        }))
    }

    /// Append a progress event and fan it out to listeners.
    pub fn record_progress(&self, summary: &str, session_id: &str) -> ProgressEvent {
        let event = ProgressEvent {
            summary: summary.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            session_id: session_id.to_string(),
        };
        let delivered = self.progress.publish(event.clone());
        tracing::info!(
            "[mcp] progress from session {} ({} listener(s)): {}",
            session_id,
            delivered,
            event.summary
        );
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn handler() -> McpHandler {
        McpHandler::new(Arc::new(EventChannel::new("mcp-progress")))
    }

    fn reply(dispatch: Dispatch) -> Value {
        match dispatch {
            Dispatch::Reply(value) => value,
            other => panic!("expected reply, got {:?}", other),
        }
    }

    fn call(summary: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "log_progress", "arguments": { "summary": summary } }
        })
        .to_string()
    }

    #[test]
    fn initialize_reports_identity() {
        let h = handler();
        let value = reply(h.handle_body(
            br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "s1",
        ));
        assert_eq!(value["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(value["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(value["result"]["capabilities"]["tools"].is_object());
    }

    #[test]
    fn notifications_get_no_response() {
        let h = handler();
        for method in ["notifications/initialized", "notifications/cancelled"] {
            let body = json!({"jsonrpc": "2.0", "method": method}).to_string();
            assert_eq!(h.handle_body(body.as_bytes(), "s1"), Dispatch::Accepted);
        }
        // Even when a client wrongly attaches an id.
        let body = json!({"jsonrpc": "2.0", "id": 9, "method": "notifications/initialized"});
        assert_eq!(
            h.handle_body(body.to_string().as_bytes(), "s1"),
            Dispatch::Accepted
        );
    }

    #[test]
    fn ping_returns_empty_object() {
        let h = handler();
        let value = reply(h.handle_body(br#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#, "s1"));
        assert_eq!(value["id"], "p");
        assert_eq!(value["result"], json!({}));
    }

    #[test]
    fn tools_list_has_only_log_progress() {
        let h = handler();
        let value = reply(h.handle_body(br#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, "s1"));
        let tools = value["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "log_progress");
    }

    #[test]
    fn log_progress_records_and_confirms() {
        let h = handler();
        let value = reply(h.handle_body(call(json!("fixed bug")).as_bytes(), "s1"));
        assert_eq!(value["result"]["content"][0]["type"], "text");
        assert!(value["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("fixed bug"));

        let log = h.progress().log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].summary, "fixed bug");
        assert_eq!(log[0].session_id, "s1");
    }

    #[test]
    fn invalid_summary_is_rejected() {
        let h = handler();
        for bad in [json!(null), json!(42), json!("")] {
            let value = reply(h.handle_body(call(bad).as_bytes(), "s1"));
            assert_eq!(value["error"]["code"], -32602);
            assert!(value["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Invalid arguments"));
        }
        let missing = json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": { "name": "log_progress", "arguments": {} }
        });
        let value = reply(h.handle_body(missing.to_string().as_bytes(), "s1"));
        assert!(value["error"].is_object());
        assert!(h.progress().is_empty());
    }

    #[test]
    fn null_id_gets_a_reply() {
        let h = handler();
        let value = reply(h.handle_body(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#, "s1"));
        assert!(value["id"].is_null());
        assert_eq!(value["result"], json!({}));

        assert!(matches!(
            h.handle_body(br#"{"jsonrpc":"2.0","method":"ping"}"#, "s1"),
            Dispatch::Accepted
        ));
    }

    #[test]
    fn summary_is_stored_verbatim() {
        let h = handler();
        for summary in ["  padded summary ", " "] {
            let value = reply(h.handle_body(call(json!(summary)).as_bytes(), "s1"));
            assert!(value["result"].is_object());
        }
        let log = h.progress().log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].summary, "  padded summary ");
        assert_eq!(log[1].summary, " ");
    }

    #[test]
    fn unknown_tool_leaves_log_unchanged() {
        let h = handler();
        let body = json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": { "name": "delete_everything", "arguments": { "summary": "x" } }
        });
        let value = reply(h.handle_body(body.to_string().as_bytes(), "s1"));
        assert_eq!(
            value["error"]["message"],
            "Unknown tool: delete_everything"
        );
        assert!(h.progress().is_empty());
    }

    #[test]
    fn unknown_method_is_not_found() {
        let h = handler();
        let value = reply(h.handle_body(
            br#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#,
            "s1",
        ));
        assert_eq!(value["error"]["code"], -32601);
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let h = handler();
        match h.handle_body(b"{not json", "s1") {
            Dispatch::Malformed(value) => {
                assert_eq!(value["error"]["code"], -32700);
                assert_eq!(value["id"], Value::Null);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn envelope_without_method_is_invalid_request() {
        let h = handler();
        let value = reply(h.handle_body(br#"{"jsonrpc":"2.0","id":6}"#, "s1"));
        assert_eq!(value["error"]["code"], -32600);
        assert_eq!(value["id"], 6);
    }

    #[test]
    fn batch_skips_notifications() {
        let h = handler();
        let body = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "initialize"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
        ]);
        let value = reply(h.handle_body(body.to_string().as_bytes(), "s1"));
        let replies = value.as_array().unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["id"], 2);
    }

    #[test]
    fn notification_only_batch_is_accepted() {
        let h = handler();
        let body = json!([{"jsonrpc": "2.0", "method": "notifications/initialized"}]);
        assert_eq!(
            h.handle_body(body.to_string().as_bytes(), "s1"),
            Dispatch::Accepted
        );
        assert!(matches!(h.handle_body(b"[]", "s1"), Dispatch::Malformed(_)));
    }

    #[test]
    fn listener_fault_does_not_fail_the_call() {
        let h = handler();
        let _sub = h.progress().subscribe(|_| panic!("ui crashed"));
        let value = reply(h.handle_body(call(json!("still logged")).as_bytes(), "s1"));
        assert!(value["result"].is_object());
        assert_eq!(h.progress().len(), 1);
    }

    proptest! {
        #[test]
        fn every_valid_summary_is_logged_and_delivered_once(summary in "[a-zA-Z0-9 .,!-]{1,150}") {
            let h = handler();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let first = seen.clone();
            let second = seen.clone();
            let _a = h.progress().subscribe(move |e: &ProgressEvent| first.lock().push(("a", e.summary.clone())));
            let _b = h.progress().subscribe(move |e: &ProgressEvent| second.lock().push(("b", e.summary.clone())));

            let value = reply(h.handle_body(call(json!(summary)).as_bytes(), "prop"));
            prop_assert!(value["result"].is_object());

            let expected = summary.clone();
            let log = h.progress().log();
            prop_assert_eq!(log.len(), 1);
            prop_assert_eq!(&log[0].summary, &expected);

            let seen = seen.lock();
            prop_assert_eq!(seen.len(), 2);
            prop_assert!(seen.contains(&("a", expected.clone())));
            prop_assert!(seen.contains(&("b", expected)));
        }
    }
}
