use std::path::PathBuf;

use tauri::State;

use crate::bridge::ops::{self, ChangeLog, IgnorePatterns, Unwatched, WatchedFolders};
use crate::bridge::{BoundaryResult, DialogPicker};
use crate::error::Result;
use crate::files::{FileWatcherStatus, WatchOutcome};
use crate::state::AppState;

// All file commands are async: watching spawns tasks on the Tokio runtime.

#[tauri::command]
pub async fn files_select_and_watch(
    state: State<'_, AppState>,
    app_handle: tauri::AppHandle,
) -> Result<BoundaryResult<WatchOutcome>> {
    let picker = DialogPicker::new(app_handle);
    Ok(ops::files_select_and_watch(&state, &picker).await)
}

#[tauri::command]
pub async fn files_watch(
    state: State<'_, AppState>,
    path: String,
) -> Result<BoundaryResult<WatchOutcome>> {
    Ok(ops::files_watch(&state, &PathBuf::from(path)))
}

#[tauri::command]
pub async fn files_unwatch(
    state: State<'_, AppState>,
    path: String,
) -> Result<BoundaryResult<Unwatched>> {
    Ok(ops::files_unwatch(&state, &PathBuf::from(path)))
}

#[tauri::command]
pub async fn files_list_watched(
    state: State<'_, AppState>,
) -> Result<BoundaryResult<WatchedFolders>> {
    Ok(ops::files_list_watched(&state))
}

#[tauri::command]
pub async fn files_get_status(
    state: State<'_, AppState>,
) -> Result<BoundaryResult<FileWatcherStatus>> {
    Ok(ops::files_get_status(&state))
}

#[tauri::command]
pub async fn files_get_change_log(state: State<'_, AppState>) -> Result<BoundaryResult<ChangeLog>> {
    Ok(ops::files_get_change_log(&state))
}

#[tauri::command]
pub async fn files_set_ignore_patterns(
    state: State<'_, AppState>,
    patterns: Vec<String>,
) -> Result<BoundaryResult<IgnorePatterns>> {
    Ok(ops::files_set_ignore_patterns(&state, patterns).await)
}
