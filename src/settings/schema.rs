//! Settings schema definitions for Buildcast configuration.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::files::FileWatcherConfig;
use crate::git::GitWatcherConfig;
use crate::mcp::McpConfig;

/// Root settings structure for Buildcast.
///
/// Loaded from `~/.buildcast/settings.toml`.
/// Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildcastSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Local MCP endpoint
    pub mcp: McpSettings,

    /// Git commit watcher
    pub git: GitSettings,

    /// Filesystem change watcher
    pub files: FileSettings,

    /// Log output
    pub logging: LoggingSettings,
}

/// MCP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct McpSettings {
    /// Port the server binds on all interfaces
    pub port: u16,

    /// Start the server when the app launches
    pub auto_start: bool,

    /// Seconds between keep-alive comments on push streams
    pub keep_alive_secs: u64,

    /// Minutes before an unused session without a push stream is dropped
    pub session_idle_mins: u64,
}

/// Git watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitSettings {
    /// Seconds between HEAD polls
    pub poll_interval_secs: u64,

    /// Diffs longer than this many characters are truncated
    pub max_diff_chars: usize,

    /// Default number of commits returned by the recent-commits query
    pub recent_commit_limit: usize,
}

/// File watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    /// Quiet period before a batch of changes is emitted
    pub debounce_ms: u64,

    /// Extra ignore patterns merged with the built-in list
    pub ignore_patterns: Vec<String>,

    /// Extension categories named in a batch summary
    pub summary_categories: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset
    pub filter: String,
}

impl Default for BuildcastSettings {
    fn default() -> Self {
        Self {
            version: 1,
            mcp: McpSettings::default(),
            git: GitSettings::default(),
            files: FileSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            port: 3777,
            auto_start: false,
            keep_alive_secs: 15,
            session_idle_mins: 30,
        }
    }
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_diff_chars: 5000,
            recent_commit_limit: 10,
        }
    }
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            ignore_patterns: Vec::new(),
            summary_categories: 3,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "buildcast=info".to_string(),
        }
    }
}

impl BuildcastSettings {
    pub fn mcp_config(&self) -> McpConfig {
        McpConfig {
            port: self.mcp.port,
            keep_alive: Duration::from_secs(self.mcp.keep_alive_secs.max(1)),
            session_idle: Duration::from_secs(self.mcp.session_idle_mins.max(1) * 60),
        }
    }

    pub fn git_config(&self) -> GitWatcherConfig {
        GitWatcherConfig {
            poll_interval: Duration::from_secs(self.git.poll_interval_secs.max(1)),
            max_diff_chars: self.git.max_diff_chars,
            recent_commit_limit: self.git.recent_commit_limit,
        }
    }

    pub fn file_config(&self) -> FileWatcherConfig {
        FileWatcherConfig {
            debounce: Duration::from_millis(self.files.debounce_ms),
            ignore_patterns: self.files.ignore_patterns.clone(),
            summary_categories: self.files.summary_categories.max(1),
        }
    }
}
