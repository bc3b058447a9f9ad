use serde::Serialize;
use thiserror::Error;

use crate::bridge::PickerError;
use crate::files::FileWatchError;
use crate::git::GitError;
use crate::mcp::McpServerError;

#[derive(Debug, Error)]
pub enum BuildcastError {
    #[error("MCP server error: {0}")]
    Mcp(#[from] McpServerError),

    #[error("Git watcher error: {0}")]
    Git(#[from] GitError),

    #[error("File watcher error: {0}")]
    Files(#[from] FileWatchError),

    #[error("{0}")]
    Picker(#[from] PickerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement Serialize for Tauri
impl Serialize for BuildcastError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BuildcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_display_string() {
        let err = BuildcastError::Internal("boom".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Internal error: boom\"");
    }

    #[test]
    fn wraps_component_errors() {
        let err: BuildcastError = GitError::NotFound("/nope".into()).into();
        assert!(err.to_string().starts_with("Git watcher error:"));
        assert!(err.to_string().contains("/nope"));
    }
}
