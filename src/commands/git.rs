use std::path::PathBuf;

use tauri::State;

use crate::bridge::ops::{self, CommitLog, RecentCommits, RepoSelection, Stopped};
use crate::bridge::{BoundaryResult, DialogPicker};
use crate::error::Result;
use crate::git::GitStatus;
use crate::state::AppState;

#[tauri::command]
pub async fn git_select_repo(
    state: State<'_, AppState>,
    app_handle: tauri::AppHandle,
) -> Result<BoundaryResult<RepoSelection>> {
    let picker = DialogPicker::new(app_handle);
    Ok(ops::git_select_repo(&state, &picker).await)
}

#[tauri::command]
pub async fn git_start_watching(
    state: State<'_, AppState>,
    path: String,
) -> Result<BoundaryResult<RepoSelection>> {
    Ok(ops::git_start_watching(&state, &PathBuf::from(path)).await)
}

#[tauri::command]
pub async fn git_stop_watching(state: State<'_, AppState>) -> Result<BoundaryResult<Stopped>> {
    Ok(ops::git_stop_watching(&state))
}

#[tauri::command]
pub async fn git_get_status(state: State<'_, AppState>) -> Result<BoundaryResult<GitStatus>> {
    Ok(ops::git_get_status(&state))
}

#[tauri::command]
pub async fn git_get_recent_commits(
    state: State<'_, AppState>,
    limit: Option<usize>,
) -> Result<BoundaryResult<RecentCommits>> {
    Ok(ops::git_get_recent_commits(&state, limit).await)
}

#[tauri::command]
pub async fn git_get_commit_log(state: State<'_, AppState>) -> Result<BoundaryResult<CommitLog>> {
    Ok(ops::git_get_commit_log(&state))
}
