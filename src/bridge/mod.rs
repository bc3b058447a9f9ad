//! Boundary between the ingestion channels and a host.
//!
//! Two directions:
//! - [`forward_events`] pushes every channel event into a [`HostRuntime`]
//! - [`ops`] exposes start/stop/status/select operations that always
//!   resolve to a [`BoundaryResult`], never an `Err` or a panic
//!
//! Both are runtime-agnostic; the Tauri commands and the CLI runner call
//! into the same functions.

pub mod ops;
mod picker;

use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;

use crate::bus::Subscription;
use crate::runtime::{HostRuntime, RuntimeEvent};
use crate::state::AppState;

pub use picker::{DirectoryPicker, NoPicker, PickerError};

#[cfg(feature = "tauri")]
pub use picker::DialogPicker;

/// `{success, error?, ...data}` as seen by the caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BoundaryResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> BoundaryResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn err(error: impl Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            data: None,
        }
    }
}

impl<T, E: Display> From<Result<T, E>> for BoundaryResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e),
        }
    }
}

/// Forward every channel of `state` to `runtime`.
///
/// Events that cannot be delivered are logged and dropped. The returned
/// subscriptions stay registered until `unsubscribe` is called on them.
pub fn forward_events(runtime: Arc<dyn HostRuntime>, state: &AppState) -> Vec<Subscription> {
    let progress = {
        let runtime = runtime.clone();
        state
            .mcp
            .subscribe(move |event| deliver(runtime.as_ref(), RuntimeEvent::Progress(event.clone())))
    };
    let commits = {
        let runtime = runtime.clone();
        state
            .git
            .subscribe(move |event| deliver(runtime.as_ref(), RuntimeEvent::Commit(event.clone())))
    };
    let changes = state.files.subscribe(move |event| {
        deliver(runtime.as_ref(), RuntimeEvent::FileChange(event.clone()))
    });

    tracing::debug!("Forwarding channel events");
    vec![progress, commits, changes]
}

fn deliver(runtime: &dyn HostRuntime, event: RuntimeEvent) {
    let channel = event.channel();
    if let Err(e) = runtime.emit(event) {
        tracing::warn!("[{}] dropped {} event: {}", runtime.name(), channel, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingRuntime {
        channels: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl HostRuntime for RecordingRuntime {
        fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError> {
            self.channels.lock().push(event.channel());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }

        fn supports_dialogs(&self) -> bool {
            false
        }

        async fn shutdown(&self) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    #[test]
    fn flattens_data_next_to_success() {
        #[derive(Serialize)]
        struct Data {
            port: u16,
        }

        let value = serde_json::to_value(BoundaryResult::ok(Data { port: 3777 })).unwrap();
        assert_eq!(value, serde_json::json!({"success": true, "port": 3777}));

        let value = serde_json::to_value(BoundaryResult::<Data>::err("nope")).unwrap();
        assert_eq!(value, serde_json::json!({"success": false, "error": "nope"}));
    }

    #[tokio::test]
    async fn forwards_until_unsubscribed() {
        let state = ops::tests::scratch_state().await;
        let runtime = Arc::new(RecordingRuntime::default());

        let mut subscriptions = forward_events(runtime.clone(), &state.state);
        state.state.mcp.handler().record_progress("wired up", "s1");
        assert_eq!(*runtime.channels.lock(), vec!["mcp-progress"]);

        for subscription in &mut subscriptions {
            subscription.unsubscribe();
        }
        state.state.mcp.handler().record_progress("unheard", "s1");
        assert_eq!(runtime.channels.lock().len(), 1);
    }
}
