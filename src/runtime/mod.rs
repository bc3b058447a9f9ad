// Host runtime abstraction: desktop window vs headless CLI.
//
// The `tauri` and `cli` features are mutually exclusive. Each provides a different
// implementation of the HostRuntime trait for its environment.

// Compile-time guard: ensure tauri and cli features are mutually exclusive
#[cfg(all(feature = "tauri", feature = "cli"))]
compile_error!("Features 'tauri' and 'cli' are mutually exclusive. Use --features tauri OR --features cli, not both.");

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::files::FileChangeEvent;
use crate::git::CommitEvent;
use crate::mcp::ProgressEvent;

/// Runtime-specific errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to emit event: {0}")]
    EmitFailed(String),

    #[error("Event receiver closed")]
    ReceiverClosed,
}

/// Events forwarded from the channels to the host.
///
/// Serialized with a `channel` tag carrying the host event name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "channel")]
pub enum RuntimeEvent {
    #[serde(rename = "mcp-progress")]
    Progress(ProgressEvent),

    #[serde(rename = "git-commit")]
    Commit(CommitEvent),

    #[serde(rename = "file-change")]
    FileChange(FileChangeEvent),
}

impl RuntimeEvent {
    /// Event name the host listens on.
    pub fn channel(&self) -> &'static str {
        match self {
            RuntimeEvent::Progress(_) => "mcp-progress",
            RuntimeEvent::Commit(_) => "git-commit",
            RuntimeEvent::FileChange(_) => "file-change",
        }
    }
}

/// Where channel events end up, and what the host can do for the bridge.
///
/// # Object Safety
/// This trait is object-safe and intended to be used as `Arc<dyn HostRuntime>`.
#[async_trait]
pub trait HostRuntime: Send + Sync + 'static {
    /// Deliver an event to the UI or output stream.
    ///
    /// # Errors
    /// Returns `RuntimeError::EmitFailed` or `RuntimeError::ReceiverClosed` when the
    /// event cannot be delivered. Callers log and drop the event.
    fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError>;

    /// Short runtime name for logs.
    fn name(&self) -> &'static str;

    /// Whether a native directory picker is available.
    fn supports_dialogs(&self) -> bool;

    /// Graceful shutdown: flush and close whatever the runtime owns.
    async fn shutdown(&self) -> Result<(), RuntimeError>;
}

// Feature-gated runtime implementations
#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "tauri")]
pub mod tauri;

// Re-exports for convenience (feature-gated)
#[cfg(feature = "cli")]
pub use cli::CliRuntime;
#[cfg(feature = "tauri")]
pub use tauri::TauriRuntime;
