use super::{HostRuntime, RuntimeError, RuntimeEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub struct CliRuntime {
    event_tx: Mutex<Option<mpsc::UnboundedSender<RuntimeEvent>>>,
}

impl CliRuntime {
    pub fn new(event_tx: mpsc::UnboundedSender<RuntimeEvent>) -> Self {
        Self {
            event_tx: Mutex::new(Some(event_tx)),
        }
    }
}

#[async_trait]
impl HostRuntime for CliRuntime {
    fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError> {
        // Send to channel for the CLI output loop to print
        self.event_tx
            .lock()
            .as_ref()
            .ok_or(RuntimeError::ReceiverClosed)?
            .send(event)
            .map_err(|_| RuntimeError::ReceiverClosed)
    }

    fn name(&self) -> &'static str {
        "cli"
    }

    fn supports_dialogs(&self) -> bool {
        false
    }

    async fn shutdown(&self) -> Result<(), RuntimeError> {
        // Dropping the sender lets the output loop drain and finish.
        self.event_tx.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::ProgressEvent;

    fn progress() -> RuntimeEvent {
        RuntimeEvent::Progress(ProgressEvent {
            summary: "x".to_string(),
            timestamp: "t".to_string(),
            session_id: "s".to_string(),
        })
    }

    #[tokio::test]
    async fn emits_until_shutdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runtime = CliRuntime::new(tx);

        runtime.emit(progress()).unwrap();
        assert!(matches!(rx.recv().await, Some(RuntimeEvent::Progress(_))));

        runtime.shutdown().await.unwrap();
        assert!(matches!(
            runtime.emit(progress()),
            Err(RuntimeError::ReceiverClosed)
        ));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn dropped_receiver_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = CliRuntime::new(tx);
        drop(rx);
        assert!(runtime.emit(progress()).is_err());
        assert!(!runtime.supports_dialogs());
    }
}
