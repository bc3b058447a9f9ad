//! HTTP transports for the MCP endpoint.
//!
//! ```text
//! GET    /                          -> health / introspection
//! POST   /mcp                       -> JSON-RPC request or batch (streamable)
//! GET    /mcp  (text/event-stream)  -> push stream for the session
//! DELETE /mcp                       -> close the session
//! GET    /sse                       -> push stream + `endpoint` event
//! POST   /message?sessionId=...     -> JSON-RPC envelope, reply on the push stream
//! ```
//!
//! Both transports are thin adapters over [`McpHandler`]; neither knows what
//! the tool does. Every response carries permissive CORS headers so agents
//! running inside a browser-hosted tool can call in.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;

use super::handler::{Dispatch, McpHandler};
use super::protocol::{RpcError, SERVER_NAME, SERVER_VERSION};
use super::session::{PushMessage, SessionRegistry, TransportKind};

/// Header carrying the session id on the streamable transport.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// State shared by every route of one running server.
pub struct TransportState {
    pub handler: McpHandler,
    pub sessions: Arc<SessionRegistry>,
    pub keep_alive: Duration,
}

/// Health check body served at `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub name: String,
    pub version: String,
    pub status: String,
    pub active_sessions: usize,
    pub total_progress_events: usize,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

pub fn router(state: Arc<TransportState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route(
            "/mcp",
            post(streamable_post)
                .get(streamable_get)
                .delete(streamable_delete),
        )
        .route("/sse", get(sse_open))
        .route("/message", post(sse_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<Arc<TransportState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        name: SERVER_NAME.to_string(),
        version: SERVER_VERSION.to_string(),
        status: "running".to_string(),
        active_sessions: state.sessions.count(),
        total_progress_events: state.handler.progress().len(),
    })
}

// =============================================================================
// Transport A: streamable request/response on /mcp
// =============================================================================

async fn streamable_post(
    State(state): State<Arc<TransportState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let requested = session_header(&headers);
    let (session_id, created) = state
        .sessions
        .resolve_or_create(requested, TransportKind::Streamable);
    if created {
        if let Some(stale) = requested {
            tracing::debug!("[mcp] unknown session {}, assigned {}", stale, session_id);
        }
    }

    let dispatch = state.handler.handle_body(&body, &session_id);
    with_session(&session_id, dispatch_response(dispatch))
}

async fn streamable_get(State(state): State<Arc<TransportState>>, headers: HeaderMap) -> Response {
    if !accepts_event_stream(&headers) {
        return rpc_error(
            StatusCode::NOT_ACCEPTABLE,
            RpcError::InvalidRequest("GET /mcp requires Accept: text/event-stream".into()),
        );
    }

    let (session_id, _) = state
        .sessions
        .resolve_or_create(session_header(&headers), TransportKind::Streamable);
    open_push_stream(&state, session_id, CloseAction::Detach, None)
}

async fn streamable_delete(
    State(state): State<Arc<TransportState>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return rpc_error(StatusCode::BAD_REQUEST, RpcError::SessionRequired);
    };

    if state.sessions.remove(session_id) {
        tracing::info!("[mcp] session {} closed by client", session_id);
        (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "sessionId": session_id })),
        )
            .into_response()
    } else {
        rpc_error(
            StatusCode::NOT_FOUND,
            RpcError::SessionNotFound(session_id.to_string()),
        )
    }
}

// =============================================================================
// Transport B: push stream on /sse, envelopes on /message
// =============================================================================

async fn sse_open(State(state): State<Arc<TransportState>>) -> Response {
    let session_id = state.sessions.create(TransportKind::Sse);
    let endpoint = format!("/message?sessionId={}", session_id);
    tracing::info!("[mcp] push stream opened for session {}", session_id);
    open_push_stream(
        &state,
        session_id,
        CloseAction::Remove,
        Some(PushMessage::new("endpoint", endpoint)),
    )
}

async fn sse_message(
    State(state): State<Arc<TransportState>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return rpc_error(StatusCode::BAD_REQUEST, RpcError::SessionRequired);
    };

    let sender = match state.sessions.stream_sender(&session_id) {
        Ok(sender) => sender,
        Err(e) => return rpc_error(StatusCode::NOT_FOUND, e),
    };

    match (state.handler.handle_body(&body, &session_id), sender) {
        (Dispatch::Reply(reply), Some(tx)) => {
            match tx.send(PushMessage::new("message", reply.to_string())) {
                Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
                // Stream went away between lookup and send; answer inline instead.
                Err(_) => (StatusCode::OK, Json(reply)).into_response(),
            }
        }
        (dispatch, _) => dispatch_response(dispatch),
    }
}

// =============================================================================
// Push streams
// =============================================================================

/// What happens to the session when its push stream closes.
#[derive(Debug, Clone, Copy)]
enum CloseAction {
    /// Keep the session, forget the stream (streamable transport).
    Detach,
    /// Drop the session entirely (`/sse` transport).
    Remove,
}

/// Runs the session bookkeeping once the HTTP response body is dropped.
struct StreamGuard {
    sessions: Arc<SessionRegistry>,
    session_id: String,
    token: u64,
    close: CloseAction,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        match self.close {
            CloseAction::Detach => self.sessions.detach_stream(&self.session_id, self.token),
            CloseAction::Remove => {
                if self.sessions.remove(&self.session_id) {
                    tracing::info!("[mcp] push stream closed, session {} removed", self.session_id);
                }
            }
        }
    }
}

struct PushStream {
    inner: UnboundedReceiverStream<PushMessage>,
    _guard: StreamGuard,
}

impl Stream for PushStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|message| message.map(|m| Ok(Event::default().event(m.event).data(m.data))))
    }
}

fn open_push_stream(
    state: &TransportState,
    session_id: String,
    close: CloseAction,
    first: Option<PushMessage>,
) -> Response {
    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(message) = first {
        let _ = tx.send(message);
    }

    let token = match state.sessions.attach_stream(&session_id, tx) {
        Ok(token) => token,
        Err(e) => return rpc_error(StatusCode::NOT_FOUND, e),
    };

    let stream = PushStream {
        inner: UnboundedReceiverStream::new(rx),
        _guard: StreamGuard {
            sessions: Arc::clone(&state.sessions),
            session_id: session_id.clone(),
            token,
            close,
        },
    };

    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive));
    with_session(&session_id, sse.into_response())
}

// =============================================================================
// Helpers
// =============================================================================

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/event-stream"))
}

fn with_session(session_id: &str, mut response: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn dispatch_response(dispatch: Dispatch) -> Response {
    match dispatch {
        Dispatch::Reply(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Dispatch::Accepted => StatusCode::ACCEPTED.into_response(),
        Dispatch::Malformed(error) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
    }
}

fn rpc_error(status: StatusCode, error: RpcError) -> Response {
    (status, Json(error.into_response())).into_response()
}
