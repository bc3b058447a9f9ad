//! Buildcast CLI - headless activity capture
//!
//! Runs the MCP server, git watcher and file watcher without the desktop
//! app and prints every event to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Build the CLI binary
//! cargo build --features cli --no-default-features --bin buildcast-cli
//!
//! # MCP server on the default port
//! ./target/debug/buildcast-cli
//!
//! # Also poll a repository and watch two folders
//! ./target/debug/buildcast-cli --repo . --watch web --watch api
//!
//! # JSON lines for scripting
//! ./target/debug/buildcast-cli --no-mcp --watch . --json | jq .
//! ```
//!
//! # Features
//!
//! This binary requires the `cli` feature flag and is mutually exclusive
//! with the `tauri` feature (GUI application).

use anyhow::Result;
use clap::Parser;

use buildcast_lib::cli::{initialize, run, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let ctx = initialize(&args).await?;

    run(ctx).await
}
