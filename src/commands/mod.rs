//! `#[tauri::command]` wrappers over the boundary operations.
//!
//! Every command resolves with a `BoundaryResult`; the outer `Result` only
//! satisfies Tauri's requirement for async commands that borrow state.

mod files;
mod git;
mod mcp;

pub use files::*;
pub use git::*;
pub use mcp::*;
