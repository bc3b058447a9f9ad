use super::{HostRuntime, RuntimeError, RuntimeEvent};
use async_trait::async_trait;
use tauri::{AppHandle, Emitter};

pub struct TauriRuntime {
    app_handle: AppHandle,
}

impl TauriRuntime {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }

    pub fn app_handle(&self) -> &AppHandle {
        &self.app_handle
    }
}

#[async_trait]
impl HostRuntime for TauriRuntime {
    fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError> {
        // The window listens per channel and expects the bare payload.
        let channel = event.channel();
        let result = match &event {
            RuntimeEvent::Progress(progress) => self.app_handle.emit(channel, progress),
            RuntimeEvent::Commit(commit) => self.app_handle.emit(channel, commit),
            RuntimeEvent::FileChange(change) => self.app_handle.emit(channel, change),
        };
        result.map_err(|e| RuntimeError::EmitFailed(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "tauri"
    }

    fn supports_dialogs(&self) -> bool {
        true // Tauri always has a window to parent the picker
    }

    async fn shutdown(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
