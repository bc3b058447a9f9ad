//! CLI execution runner.
//!
//! Starts the requested channels, streams events until Ctrl-C, then shuts
//! everything down.

use anyhow::{bail, Result};
use tokio::task::JoinHandle;

use crate::bridge::ops;

use super::bootstrap::CliContext;
use super::output::run_event_loop;

/// Run until interrupted.
///
/// Fails without waiting when a requested channel cannot start.
pub async fn run(mut ctx: CliContext) -> Result<()> {
    if !ctx.args.has_channels() {
        bail!("Nothing to do: pass --repo or --watch, or drop --no-mcp");
    }

    let Some(event_rx) = ctx.event_rx.take() else {
        bail!("Event receiver already taken");
    };
    let json_mode = ctx.args.json_output();
    let output_handle: JoinHandle<Result<()>> =
        tokio::spawn(async move { run_event_loop(event_rx, json_mode).await });

    let started = start_channels(&ctx).await;
    if started.is_ok() {
        eprintln!("[cli] Listening, press Ctrl-C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        }
        eprintln!("[cli] Stopping");
    }

    // Closing the runtime ends the output loop once it has drained.
    ctx.shutdown().await?;
    match output_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!("Output handler error: {}", e);
        }
        Err(e) => {
            tracing::warn!("Output handler panicked: {}", e);
        }
    }

    started
}

async fn start_channels(ctx: &CliContext) -> Result<()> {
    let state = &ctx.state;
    let args = &ctx.args;

    if !args.no_mcp {
        let result = ops::mcp_start(state, args.port).await;
        match result.data {
            Some(endpoints) => {
                eprintln!("[mcp] Local:   {}", endpoints.local_url);
                eprintln!("[mcp] Network: {}", endpoints.network_url);
                eprintln!("[mcp] SSE:     {}", endpoints.sse_url);
            }
            None => bail!("MCP server: {}", result.error.unwrap_or_default()),
        }
    }

    if let Some(repo) = &args.repo {
        let result = ops::git_start_watching(state, repo).await;
        match result.data {
            Some(selection) => eprintln!(
                "[git] Watching {} ({})",
                selection.path.display(),
                selection.branch
            ),
            None => bail!("Git watcher: {}", result.error.unwrap_or_default()),
        }
    }

    if !args.ignore.is_empty() {
        let mut patterns = state.files.ignore_patterns();
        patterns.extend(args.ignore.iter().cloned());
        // Command-line patterns apply to this run only.
        state.files.set_ignore_patterns(patterns);
    }

    for folder in &args.watch {
        let result = ops::files_watch(state, folder);
        match result.data {
            Some(outcome) => eprintln!("[files] Watching {}", outcome.path.display()),
            None => bail!("File watcher: {}", result.error.unwrap_or_default()),
        }
    }

    Ok(())
}
