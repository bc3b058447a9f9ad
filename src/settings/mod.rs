//! TOML-based settings for Buildcast.
//!
//! Settings are loaded from `~/.buildcast/settings.toml`; every section is
//! optional. Component configs (`McpConfig`, `GitWatcherConfig`,
//! `FileWatcherConfig`) are derived from the loaded settings.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::settings::SettingsManager;
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//! let git = GitWatcher::new(settings.git_config());
//! ```

pub mod loader;
pub mod schema;

pub use loader::{settings_path, EnvOverrides, SettingsManager};
pub use schema::BuildcastSettings;
