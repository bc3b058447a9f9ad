//! Native directory selection for the `*_select_*` boundary operations.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PickerError {
    #[error("Directory picker unavailable in this runtime")]
    Unavailable,

    #[error("Selection cancelled")]
    Cancelled,

    #[error("Directory picker failed: {0}")]
    Failed(String),
}

/// Asks the user for a directory.
#[async_trait]
pub trait DirectoryPicker: Send + Sync {
    async fn pick_directory(&self, title: &str) -> Result<PathBuf, PickerError>;
}

/// Picker for hosts without a window.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPicker;

#[async_trait]
impl DirectoryPicker for NoPicker {
    async fn pick_directory(&self, _title: &str) -> Result<PathBuf, PickerError> {
        Err(PickerError::Unavailable)
    }
}

#[cfg(feature = "tauri")]
pub use dialog::DialogPicker;

#[cfg(feature = "tauri")]
mod dialog {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use tauri::AppHandle;
    use tauri_plugin_dialog::DialogExt;
    use tokio::sync::oneshot;

    use super::{DirectoryPicker, PickerError};

    /// Folder dialog from `tauri-plugin-dialog`.
    pub struct DialogPicker {
        app_handle: AppHandle,
    }

    impl DialogPicker {
        pub fn new(app_handle: AppHandle) -> Self {
            Self { app_handle }
        }
    }

    #[async_trait]
    impl DirectoryPicker for DialogPicker {
        async fn pick_directory(&self, title: &str) -> Result<PathBuf, PickerError> {
            let (tx, rx) = oneshot::channel();
            self.app_handle
                .dialog()
                .file()
                .set_title(title.to_string())
                .pick_folder(move |folder| {
                    let _ = tx.send(folder);
                });

            let folder = rx
                .await
                .map_err(|_| PickerError::Failed("dialog closed without a result".to_string()))?;
            match folder {
                Some(path) => path
                    .into_path()
                    .map_err(|e| PickerError::Failed(e.to_string())),
                None => Err(PickerError::Cancelled),
            }
        }
    }
}
