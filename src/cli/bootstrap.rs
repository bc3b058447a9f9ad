//! CLI bootstrap - build the channels and wire them to the CLI runtime.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::bridge::forward_events;
use crate::bus::Subscription;
use crate::runtime::{CliRuntime, HostRuntime, RuntimeEvent};
use crate::settings::SettingsManager;
use crate::state::AppState;

use super::args::Args;

/// Everything the CLI owns while running.
///
/// This mirrors the Tauri-managed `AppState` plus the runtime and the
/// receiving end of its event channel.
pub struct CliContext {
    /// Runtime abstraction for event emission
    pub runtime: Arc<dyn HostRuntime>,

    /// Event receiver for output handling (taken by the runner)
    pub event_rx: Option<mpsc::UnboundedReceiver<RuntimeEvent>>,

    /// Channels
    pub state: AppState,

    /// Command-line arguments
    pub args: Args,

    subscriptions: Vec<Subscription>,
}

impl CliContext {
    /// Stop every channel, detach forwarding, then close the runtime.
    pub async fn shutdown(mut self) -> Result<()> {
        self.state.shutdown().await;

        for subscription in &mut self.subscriptions {
            subscription.unsubscribe();
        }

        if let Err(e) = self.runtime.shutdown().await {
            tracing::warn!("Runtime shutdown error: {}", e);
        }

        Ok(())
    }
}

/// Initialize logging, settings and channels.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    let settings_manager = Arc::new(
        SettingsManager::new()
            .await
            .context("Failed to initialize settings manager")?,
    );

    let settings = settings_manager.get().await;
    let filter = if args.verbose {
        "buildcast=debug"
    } else {
        settings.logging.filter.as_str()
    };
    crate::init_tracing(filter);

    // Ensure settings file exists (creates template on first run)
    if let Err(e) = settings_manager.ensure_settings_file().await {
        tracing::warn!("Failed to create settings template: {}", e);
    }

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
    }

    let state = AppState::with_settings(settings_manager, &settings);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<RuntimeEvent>();
    let runtime: Arc<dyn HostRuntime> = Arc::new(CliRuntime::new(event_tx));
    let subscriptions = forward_events(runtime.clone(), &state);

    Ok(CliContext {
        runtime,
        event_rx: Some(event_rx),
        state,
        args: args.clone(),
        subscriptions,
    })
}
