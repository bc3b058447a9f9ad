//! Per-channel event fan-out.
//!
//! Every producer (MCP progress, git commits, file changes) owns one
//! [`EventChannel`]: an append-only log that lives for the whole process plus
//! a registry of synchronous listeners.
//!
//! ```text
//! producer --publish()--> EventChannel
//!                           +-- log: Vec<T>        (never evicted)
//!                           +-- listeners: [(id, Fn(&T))]
//!                                   |
//!                                   +--> bridge (Tauri / CLI runtime)
//!                                   +--> tests, other in-process consumers
//! ```
//!
//! Delivery is at-most-once to whoever is subscribed at publish time. A
//! listener that panics is caught and logged; remaining listeners still run
//! and the producer never observes the fault.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Callback invoked for each published event.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ListenerList<T> = RwLock<Vec<(u64, Listener<T>)>>;

/// Listener registry plus in-memory event log for one channel.
pub struct EventChannel<T> {
    name: &'static str,
    listeners: Arc<ListenerList<T>>,
    log: RwLock<Vec<T>>,
    next_id: AtomicU64,
}

impl<T> EventChannel<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Arc::new(RwLock::new(Vec::new())),
            log: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Channel name used in log lines.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a listener. The returned handle removes it again.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));

        let weak: Weak<ListenerList<T>> = Arc::downgrade(&self.listeners);
        Subscription {
            channel: self.name,
            remove: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.write().retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    /// Append `event` to the log, then hand it to every current listener.
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn publish(&self, event: T) -> usize {
        self.log.write().push(event.clone());

        // Snapshot so listeners may (un)subscribe while being called.
        let listeners: Vec<Listener<T>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::warn!(
                        "[{}] listener panicked: {}",
                        self.name,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        delivered
    }

    /// Copy of every event published so far, oldest first.
    pub fn log(&self) -> Vec<T> {
        self.log.read().clone()
    }

    /// Number of events published so far.
    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Handle returned by [`EventChannel::subscribe`].
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it. Unsubscribing twice is a no-op.
pub struct Subscription {
    channel: &'static str,
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
            tracing::debug!("[{}] listener unsubscribed", self.channel);
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove.is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn publish_appends_to_log_and_notifies_once() {
        let channel = EventChannel::<u32>::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = channel.subscribe(move |v| sink.lock().push(*v));

        assert_eq!(channel.publish(7), 1);
        assert_eq!(channel.publish(8), 1);

        assert_eq!(channel.log(), vec![7, 8]);
        assert_eq!(*seen.lock(), vec![7, 8]);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let channel = EventChannel::<u32>::new("test");
        let seen = Arc::new(Mutex::new(0));

        let _bad = channel.subscribe(|_| panic!("listener fault"));
        let sink = seen.clone();
        let _good = channel.subscribe(move |_| *sink.lock() += 1);

        assert_eq!(channel.publish(1), 1);
        assert_eq!(*seen.lock(), 1);
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let channel = EventChannel::<u32>::new("test");
        let mut sub = channel.subscribe(|_| {});
        assert_eq!(channel.listener_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(channel.listener_count(), 0);
        assert_eq!(channel.publish(1), 0);
    }

    #[test]
    fn unsubscribe_only_removes_own_listener() {
        let channel = EventChannel::<u32>::new("test");
        let mut first = channel.subscribe(|_| {});
        let _second = channel.subscribe(|_| {});

        first.unsubscribe();
        assert_eq!(channel.listener_count(), 1);
    }

    #[test]
    fn unsubscribe_after_channel_dropped() {
        let channel = EventChannel::<u32>::new("test");
        let mut sub = channel.subscribe(|_| {});
        drop(channel);
        sub.unsubscribe();
    }

    #[test]
    fn listener_can_subscribe_during_publish() {
        let channel = Arc::new(EventChannel::<u32>::new("test"));
        let inner = channel.clone();
        let _sub = channel.subscribe(move |_| {
            let _ = inner.subscribe(|_| {});
        });

        channel.publish(1);
        assert_eq!(channel.listener_count(), 2);
    }
}
