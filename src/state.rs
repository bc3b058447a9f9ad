use std::sync::Arc;

use anyhow::Result;

use crate::files::FileWatcher;
use crate::git::GitWatcher;
use crate::mcp::McpServer;
use crate::settings::{BuildcastSettings, SettingsManager};

/// Owns one instance of each ingestion channel plus the settings they were built from.
pub struct AppState {
    pub settings: Arc<SettingsManager>,
    pub mcp: Arc<McpServer>,
    pub git: GitWatcher,
    pub files: FileWatcher,
}

impl AppState {
    /// Load settings from the default location and build every channel from them.
    pub async fn load() -> Result<Self> {
        let manager = SettingsManager::new().await?;
        Ok(Self::from_manager(Arc::new(manager)).await)
    }

    pub async fn from_manager(settings: Arc<SettingsManager>) -> Self {
        let snapshot = settings.get().await;
        Self::with_settings(settings, &snapshot)
    }

    pub fn with_settings(settings: Arc<SettingsManager>, snapshot: &BuildcastSettings) -> Self {
        Self {
            settings,
            mcp: Arc::new(McpServer::new(snapshot.mcp_config())),
            git: GitWatcher::new(snapshot.git_config()),
            files: FileWatcher::new(snapshot.file_config()),
        }
    }

    /// Stop every channel. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mcp = self.mcp.stop().await;
        let git = self.git.stop_watching();
        let folders = self.files.unwatch_all();
        tracing::info!(
            "Shut down channels (mcp: {}, git: {}, folders: {})",
            mcp,
            git,
            folders
        );
    }
}
