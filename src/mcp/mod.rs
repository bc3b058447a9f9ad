//! Local MCP endpoint that coding agents report progress to.
//!
//! Agents connect over one of two HTTP transports and call the single
//! `log_progress` tool. Every successful call becomes a [`ProgressEvent`]
//! on the `mcp-progress` channel.
//!
//! ```text
//! +--------------------------------------------+
//! |  axum Router (transport.rs)                |
//! |    /mcp  streamable request/response       |
//! |    /sse + /message  push-then-post         |
//! +--------------------------------------------+
//!          |                     |
//!          v                     v
//!   SessionRegistry        McpHandler (JSON-RPC)
//!                                |
//!                                v
//!                    EventChannel<ProgressEvent>
//! ```

mod handler;
mod protocol;
mod server;
mod session;
mod transport;

#[cfg(test)]
mod integration_tests;

pub use handler::{Dispatch, McpHandler, ProgressEvent};
pub use protocol::{RpcError, LOG_PROGRESS_TOOL, PROTOCOL_VERSION, SERVER_NAME};
pub use server::{network_address, McpConfig, McpEndpoints, McpServer, McpServerError, McpStatus};
pub use session::{SessionRegistry, TransportKind};
pub use transport::{HealthResponse, SESSION_HEADER};
