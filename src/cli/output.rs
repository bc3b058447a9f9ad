//! CLI output handling - Event receiver loop.
//!
//! Receives forwarded channel events and prints them either as one JSON
//! object per line or as a short human-readable line.

use std::io::{self, Write};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::runtime::RuntimeEvent;

/// Print events until the runtime closes the channel.
pub async fn run_event_loop(
    mut event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    json_mode: bool,
) -> Result<()> {
    let mut stdout = io::stdout();
    while let Some(event) = event_rx.recv().await {
        let line = if json_mode {
            serde_json::to_string(&event)?
        } else {
            format_event(&event)
        };
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
    }

    Ok(())
}

/// One-line terminal rendering of an event.
fn format_event(event: &RuntimeEvent) -> String {
    match event {
        RuntimeEvent::Progress(progress) => {
            format!("[mcp] {} ({})", progress.summary, short_id(&progress.session_id))
        }
        RuntimeEvent::Commit(commit) => format!(
            "[git] {} {} {}: {}",
            commit.branch,
            short_id(&commit.commit.hash),
            commit.commit.author,
            truncate(&commit.commit.message, 72)
        ),
        RuntimeEvent::FileChange(change) => {
            format!("[files] {}: {}", change.folder_path, change.summary)
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate a string to a maximum length in characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
