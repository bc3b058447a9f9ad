//! CLI argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// Buildcast CLI - capture coding activity without the desktop app
#[derive(Parser, Debug, Clone)]
#[command(name = "buildcast-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// MCP server port (default: from settings, 3777)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Do not start the MCP server
    #[arg(long)]
    pub no_mcp: bool,

    /// Git repository to poll for new commits
    #[arg(short = 'r', long)]
    pub repo: Option<PathBuf>,

    /// Folder to watch for file changes (repeatable)
    #[arg(short = 'w', long = "watch")]
    pub watch: Vec<PathBuf>,

    /// Extra ignore pattern for the file watcher (repeatable)
    #[arg(short = 'i', long = "ignore")]
    pub ignore: Vec<String>,

    /// Output events as JSON lines (default when stdout is not a terminal)
    #[arg(long)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    /// JSON when asked for, or when stdout is piped.
    pub fn json_output(&self) -> bool {
        self.json || !atty::is(atty::Stream::Stdout)
    }

    /// Whether any channel would be started.
    pub fn has_channels(&self) -> bool {
        !self.no_mcp || self.repo.is_some() || !self.watch.is_empty()
    }
}
