pub mod bridge;
pub mod bus;
#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "tauri")]
mod commands;
pub mod error;
pub mod files;
pub mod git;
pub mod mcp;
pub mod runtime;
pub mod settings;
pub mod state;

use tracing_subscriber::EnvFilter;

#[cfg(feature = "tauri")]
use commands::*;

/// Install the global subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Later calls are ignored.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_directive).unwrap_or_else(|_| EnvFilter::new("buildcast=info"))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(feature = "tauri")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;

    use tauri::Manager;

    use crate::bridge::{forward_events, ops};
    use crate::runtime::{HostRuntime, TauriRuntime};
    use crate::state::AppState;

    let state = match tauri::async_runtime::block_on(AppState::load()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Failed to load settings: {:#}", e);
            std::process::exit(1);
        }
    };
    let settings = tauri::async_runtime::block_on(state.settings.get());
    init_tracing(&settings.logging.filter);

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(state)
        .setup(move |app| {
            let handle = app.handle().clone();
            let runtime: Arc<dyn HostRuntime> = Arc::new(TauriRuntime::new(handle.clone()));

            // Forwarding lasts for the whole app lifetime.
            let state = app.state::<AppState>();
            forward_events(runtime, &state);

            if let Err(e) = tauri::async_runtime::block_on(state.settings.ensure_settings_file()) {
                tracing::warn!("Failed to create settings template: {}", e);
            }

            if settings.mcp.auto_start {
                tauri::async_runtime::spawn(async move {
                    let state = handle.state::<AppState>();
                    let result = ops::mcp_start(&state, None).await;
                    if let Some(error) = result.error {
                        tracing::warn!("MCP auto-start failed: {}", error);
                    }
                });
            }
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // MCP commands
            mcp_start,
            mcp_stop,
            mcp_get_status,
            mcp_get_progress_log,
            mcp_get_network_address,
            // Git commands
            git_select_repo,
            git_start_watching,
            git_stop_watching,
            git_get_status,
            git_get_recent_commits,
            git_get_commit_log,
            // File commands
            files_select_and_watch,
            files_watch,
            files_unwatch,
            files_list_watched,
            files_get_status,
            files_get_change_log,
            files_set_ignore_patterns,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app, event| {
        if let tauri::RunEvent::Exit = event {
            let state = app.state::<AppState>();
            tauri::async_runtime::block_on(state.shutdown());
        }
    });
}
