//! JSON-RPC 2.0 envelopes and error codes spoken on the MCP endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "buildcast-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The only tool exposed to agents.
pub const LOG_PROGRESS_TOOL: &str = "log_progress";

pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    // Transport-level failures live in the implementation-defined range.
    pub const SESSION_NOT_FOUND: i64 = -32001;
    pub const SESSION_REQUIRED: i64 = -32002;
}

/// Incoming request or notification.
///
/// A missing `id` marks a notification, which never gets a response. An
/// explicit `"id": null` is kept and answered with a null id.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present_value")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

// Only runs when the field is present, so `null` becomes `Some(Value::Null)`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorBody>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcErrorBody {
                code: error.code(),
                message: error.to_string(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Errors reported to MCP clients as JSON-RPC error objects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Missing session id")]
    SessionRequired,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::Parse(_) => codes::PARSE_ERROR,
            RpcError::InvalidRequest(_) => codes::INVALID_REQUEST,
            RpcError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            RpcError::UnknownTool(_) | RpcError::InvalidArguments(_) => codes::INVALID_PARAMS,
            RpcError::SessionNotFound(_) => codes::SESSION_NOT_FOUND,
            RpcError::SessionRequired => codes::SESSION_REQUIRED,
            RpcError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Error envelope not tied to any request id.
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::failure(Value::Null, &self)
    }
}

/// Tool descriptor returned by `tools/list`.
pub fn log_progress_descriptor() -> Value {
    serde_json::json!({
        "name": LOG_PROGRESS_TOOL,
        "description": "Record a short progress update about the coding work you just did. \
            Call this after finishing a meaningful step (a fix, a feature, a refactor). \
            Keep the summary to one sentence, ideally under 120 characters.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "One-sentence description of what was accomplished"
                }
            },
            "required": ["summary"]
        }
    })
}
