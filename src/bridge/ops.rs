//! Boundary operations shared by every host.
//!
//! Each operation converts component errors into `{success: false, error}`
//! so callers across a process boundary never see a rejected call.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{BoundaryResult, DirectoryPicker};
use crate::files::{FileChangeEvent, FileWatcherStatus, WatchOutcome};
use crate::git::{CommitEvent, CommitInfo, GitStatus, RepoInfo};
use crate::mcp::{network_address, McpEndpoints, McpStatus, ProgressEvent};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepoSelection {
    pub path: PathBuf,
    pub branch: String,
}

impl From<RepoInfo> for RepoSelection {
    fn from(info: RepoInfo) -> Self {
        Self {
            path: info.root,
            branch: info.branch,
        }
    }
}

/// Result of an idempotent stop.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stopped {
    pub was_running: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecentCommits {
    pub commits: Vec<CommitInfo>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommitLog {
    pub commits: Vec<CommitEvent>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Unwatched {
    pub path: PathBuf,
    pub was_watching: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WatchedFolders {
    pub folders: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChangeLog {
    pub events: Vec<FileChangeEvent>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IgnorePatterns {
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressLog {
    pub events: Vec<ProgressEvent>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetworkAddress {
    pub address: String,
}

// ============================================================================
// Git
// ============================================================================

/// Ask for a directory and validate it as a repository. Does not start watching.
pub async fn git_select_repo(
    state: &AppState,
    picker: &dyn DirectoryPicker,
) -> BoundaryResult<RepoSelection> {
    let path = match picker.pick_directory("Select a git repository").await {
        Ok(path) => path,
        Err(e) => return BoundaryResult::err(e),
    };
    state.git.select_repo(&path).await.map(RepoSelection::from).into()
}

pub async fn git_start_watching(state: &AppState, path: &Path) -> BoundaryResult<RepoSelection> {
    state
        .git
        .start_watching(path)
        .await
        .map(RepoSelection::from)
        .into()
}

pub fn git_stop_watching(state: &AppState) -> BoundaryResult<Stopped> {
    BoundaryResult::ok(Stopped {
        was_running: state.git.stop_watching(),
    })
}

pub fn git_get_status(state: &AppState) -> BoundaryResult<GitStatus> {
    BoundaryResult::ok(state.git.status())
}

pub async fn git_get_recent_commits(
    state: &AppState,
    limit: Option<usize>,
) -> BoundaryResult<RecentCommits> {
    state
        .git
        .recent_commits(limit)
        .await
        .map(|commits| RecentCommits { commits })
        .into()
}

pub fn git_get_commit_log(state: &AppState) -> BoundaryResult<CommitLog> {
    BoundaryResult::ok(CommitLog {
        commits: state.git.commit_log(),
    })
}

// ============================================================================
// Files
// ============================================================================

pub async fn files_select_and_watch(
    state: &AppState,
    picker: &dyn DirectoryPicker,
) -> BoundaryResult<WatchOutcome> {
    match picker.pick_directory("Select a folder to watch").await {
        Ok(path) => files_watch(state, &path),
        Err(e) => BoundaryResult::err(e),
    }
}

pub fn files_watch(state: &AppState, path: &Path) -> BoundaryResult<WatchOutcome> {
    state.files.watch(path).into()
}

pub fn files_unwatch(state: &AppState, path: &Path) -> BoundaryResult<Unwatched> {
    BoundaryResult::ok(Unwatched {
        path: path.to_path_buf(),
        was_watching: state.files.unwatch(path),
    })
}

pub fn files_list_watched(state: &AppState) -> BoundaryResult<WatchedFolders> {
    BoundaryResult::ok(WatchedFolders {
        folders: state.files.watched_folders(),
    })
}

pub fn files_get_status(state: &AppState) -> BoundaryResult<FileWatcherStatus> {
    BoundaryResult::ok(state.files.status())
}

pub fn files_get_change_log(state: &AppState) -> BoundaryResult<ChangeLog> {
    BoundaryResult::ok(ChangeLog {
        events: state.files.change_log(),
    })
}

/// Replace the custom ignore patterns and persist them to settings.
///
/// A failed save is logged; the new patterns are active either way.
pub async fn files_set_ignore_patterns(
    state: &AppState,
    patterns: Vec<String>,
) -> BoundaryResult<IgnorePatterns> {
    state.files.set_ignore_patterns(patterns);
    let patterns = state.files.ignore_patterns();

    let persisted = patterns.clone();
    if let Err(e) = state
        .settings
        .modify(move |stored| stored.files.ignore_patterns = persisted)
        .await
    {
        tracing::warn!("Failed to persist ignore patterns: {:#}", e);
    }

    BoundaryResult::ok(IgnorePatterns { patterns })
}

// ============================================================================
// MCP
// ============================================================================

pub async fn mcp_start(state: &AppState, port: Option<u16>) -> BoundaryResult<McpEndpoints> {
    state.mcp.start(port).await.into()
}

pub async fn mcp_stop(state: &AppState) -> BoundaryResult<Stopped> {
    BoundaryResult::ok(Stopped {
        was_running: state.mcp.stop().await,
    })
}

pub async fn mcp_get_status(state: &AppState) -> BoundaryResult<McpStatus> {
    BoundaryResult::ok(state.mcp.status().await)
}

pub fn mcp_get_progress_log(state: &AppState) -> BoundaryResult<ProgressLog> {
    BoundaryResult::ok(ProgressLog {
        events: state.mcp.progress_log(),
    })
}

pub fn mcp_get_network_address() -> BoundaryResult<NetworkAddress> {
    BoundaryResult::ok(NetworkAddress {
        address: network_address().to_string(),
    })
}
