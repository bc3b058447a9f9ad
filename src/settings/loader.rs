//! Settings loading, saving, and environment overrides.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.buildcast/settings.toml`
//! - Applying `BUILDCAST_*` environment overrides
//! - Atomic file writes with temp file + rename
//! - First-run template generation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use super::schema::BuildcastSettings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Overrides `mcp.port`.
pub const ENV_MCP_PORT: &str = "BUILDCAST_MCP_PORT";

/// Overrides `logging.filter`.
pub const ENV_LOG: &str = "BUILDCAST_LOG";

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".buildcast")
        .join("settings.toml")
}

/// `BUILDCAST_*` values captured once, applied on top of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub mcp_port: Option<u16>,
    pub log_filter: Option<String>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`. Invalid values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mcp_port = lookup(ENV_MCP_PORT).and_then(|port| match port.trim().parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!("Ignoring invalid {}={:?}", ENV_MCP_PORT, port);
                None
            }
        });
        let log_filter = lookup(ENV_LOG).filter(|filter| !filter.trim().is_empty());

        Self {
            mcp_port,
            log_filter,
        }
    }

    fn apply(&self, mut settings: BuildcastSettings) -> BuildcastSettings {
        if let Some(port) = self.mcp_port {
            settings.mcp.port = port;
        }
        if let Some(filter) = &self.log_filter {
            settings.logging.filter = filter.clone();
        }
        settings
    }
}

struct Loaded {
    /// Exactly what the file holds (or defaults); this is what gets saved
    stored: BuildcastSettings,
    /// `stored` with env overrides applied; this is what components see
    effective: BuildcastSettings,
}

/// Manages settings loading and persistence.
///
/// Env overrides only affect the in-memory view; they are never written back.
pub struct SettingsManager {
    loaded: RwLock<Loaded>,

    overrides: EnvOverrides,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager, loading from the default location.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Create a SettingsManager backed by a specific file.
    pub async fn with_path(path: PathBuf) -> Result<Self> {
        Self::with_overrides(path, EnvOverrides::from_env()).await
    }

    /// Create a SettingsManager with explicit overrides instead of the environment.
    pub async fn with_overrides(path: PathBuf, overrides: EnvOverrides) -> Result<Self> {
        let stored = Self::load_from_path(&path).await?;
        let effective = overrides.apply(stored.clone());
        Ok(Self {
            loaded: RwLock::new(Loaded { stored, effective }),
            overrides,
            path,
        })
    }

    /// Load settings from a specific path.
    async fn load_from_path(path: &Path) -> Result<BuildcastSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(BuildcastSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")?;
        let settings: BuildcastSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;
        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Get the current settings with env overrides applied (read-only).
    pub async fn get(&self) -> BuildcastSettings {
        self.loaded.read().await.effective.clone()
    }

    /// Replace the stored settings and persist them to disk.
    pub async fn update(&self, new_settings: BuildcastSettings) -> Result<()> {
        self.modify(|stored| *stored = new_settings).await
    }

    /// Edit the stored settings in place and persist them.
    ///
    /// The read, edit and write happen under one lock, so concurrent callers
    /// cannot lose each other's changes.
    pub async fn modify<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut BuildcastSettings),
    {
        let mut loaded = self.loaded.write().await;
        let mut stored = loaded.stored.clone();
        edit(&mut stored);

        self.save(&stored).await?;
        loaded.effective = self.overrides.apply(stored.clone());
        loaded.stored = stored;
        Ok(())
    }

    async fn save(&self, settings: &BuildcastSettings) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, &toml_string).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::info!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Get the settings file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }
}
