use tauri::State;

use crate::bridge::ops::{self, NetworkAddress, ProgressLog, Stopped};
use crate::bridge::BoundaryResult;
use crate::error::Result;
use crate::mcp::{McpEndpoints, McpStatus};
use crate::state::AppState;

#[tauri::command]
pub async fn mcp_start(
    state: State<'_, AppState>,
    port: Option<u16>,
) -> Result<BoundaryResult<McpEndpoints>> {
    Ok(ops::mcp_start(&state, port).await)
}

#[tauri::command]
pub async fn mcp_stop(state: State<'_, AppState>) -> Result<BoundaryResult<Stopped>> {
    Ok(ops::mcp_stop(&state).await)
}

#[tauri::command]
pub async fn mcp_get_status(state: State<'_, AppState>) -> Result<BoundaryResult<McpStatus>> {
    Ok(ops::mcp_get_status(&state).await)
}

#[tauri::command]
pub async fn mcp_get_progress_log(
    state: State<'_, AppState>,
) -> Result<BoundaryResult<ProgressLog>> {
    Ok(ops::mcp_get_progress_log(&state))
}

#[tauri::command]
pub fn mcp_get_network_address() -> BoundaryResult<NetworkAddress> {
    ops::mcp_get_network_address()
}
