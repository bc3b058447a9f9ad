//! Session registry for the MCP endpoint.
//!
//! Maps an opaque session id to its transport state. Sessions are minted on
//! first contact (streamable transport) or when a push stream is opened
//! (`/sse` transport), and are dropped on `DELETE /mcp`, on disconnect of an
//! `/sse` stream, after sitting idle without a push stream, or in bulk when
//! the server stops.
//!
//! # Thread Safety
//!
//! `SessionRegistry` uses `DashMap`; no entry guard is held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::RpcError;

/// Which transport created the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// `POST/GET/DELETE /mcp`
    Streamable,
    /// `GET /sse` + `POST /message`
    Sse,
}

/// One server-sent event queued for a push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub event: String,
    pub data: String,
}

impl PushMessage {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

pub type PushSender = mpsc::UnboundedSender<PushMessage>;

/// Open push stream attached to a session.
#[derive(Debug)]
struct AttachedStream {
    token: u64,
    sender: PushSender,
}

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub kind: TransportKind,
    pub created_at: DateTime<Utc>,
    last_seen: Instant,
    stream: Option<AttachedStream>,
}

impl Session {
    fn new(kind: TransportKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            created_at: Utc::now(),
            last_seen: Instant::now(),
            stream: None,
        }
    }

    fn has_open_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.sender.is_closed())
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    next_token: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new session and return its id.
    pub fn create(&self, kind: TransportKind) -> String {
        let session = Session::new(kind);
        let id = session.id.clone();
        self.sessions.insert(id.clone(), session);
        tracing::debug!("[mcp] session {} created ({:?})", id, kind);
        id
    }

    /// Reuse `requested` when it names a live session, otherwise mint one.
    ///
    /// Returns the id and whether it was newly created.
    pub fn resolve_or_create(&self, requested: Option<&str>, kind: TransportKind) -> (String, bool) {
        if let Some(mut session) = requested.and_then(|id| self.sessions.get_mut(id)) {
            session.last_seen = Instant::now();
            return (session.id.clone(), false);
        }
        (self.create(kind), true)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Attach a push stream, replacing any previous one.
    ///
    /// The returned token identifies this attachment for [`Self::detach_stream`].
    pub fn attach_stream(&self, id: &str, sender: PushSender) -> Result<u64, RpcError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RpcError::SessionNotFound(id.to_string()))?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        session.last_seen = Instant::now();
        session.stream = Some(AttachedStream { token, sender });
        Ok(token)
    }

    /// Detach the stream identified by `token`, keeping the session.
    ///
    /// A newer stream attached in the meantime is left in place.
    pub fn detach_stream(&self, id: &str, token: u64) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            if session.stream.as_ref().map(|s| s.token) == Some(token) {
                session.stream = None;
                session.last_seen = Instant::now();
                tracing::debug!("[mcp] push stream detached from session {}", id);
            }
        }
    }

    /// Push sender for a session.
    ///
    /// `Err` for an unknown id, `Ok(None)` for a known session with no open stream.
    pub fn stream_sender(&self, id: &str) -> Result<Option<PushSender>, RpcError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RpcError::SessionNotFound(id.to_string()))?;
        session.last_seen = Instant::now();
        Ok(session
            .stream
            .as_ref()
            .filter(|s| !s.sender.is_closed())
            .map(|s| s.sender.clone()))
    }

    /// Remove a session, closing its push stream.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::debug!("[mcp] session {} removed", id);
        }
        removed
    }

    /// Drop sessions without an open push stream that have not been used for `max_idle`.
    ///
    /// Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.evict_idle_at(Instant::now(), max_idle)
    }

    fn evict_idle_at(&self, now: Instant, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            session.has_open_stream() || now.saturating_duration_since(session.last_seen) < max_idle
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::debug!("[mcp] evicted {} idle session(s)", evicted);
        }
        evicted
    }

    /// Drop every session and close every push stream. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_resolve() {
        let registry = SessionRegistry::new();
        let id = registry.create(TransportKind::Streamable);
        assert!(registry.contains(&id));

        let (same, created) = registry.resolve_or_create(Some(&id), TransportKind::Streamable);
        assert_eq!(same, id);
        assert!(!created);

        let (other, created) =
            registry.resolve_or_create(Some("stale-id"), TransportKind::Streamable);
        assert_ne!(other, "stale-id");
        assert!(created);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn unknown_differs_from_idle() {
        let registry = SessionRegistry::new();
        let id = registry.create(TransportKind::Sse);

        assert!(matches!(registry.stream_sender(&id), Ok(None)));
        assert!(matches!(
            registry.stream_sender("missing"),
            Err(RpcError::SessionNotFound(_))
        ));
    }

    #[test]
    fn detach_ignores_stale_token() {
        let registry = SessionRegistry::new();
        let id = registry.create(TransportKind::Streamable);

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let first = registry.attach_stream(&id, tx1).unwrap();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let second = registry.attach_stream(&id, tx2).unwrap();

        registry.detach_stream(&id, first);
        assert!(registry.stream_sender(&id).unwrap().is_some());

        registry.detach_stream(&id, second);
        assert!(registry.stream_sender(&id).unwrap().is_none());
        assert!(registry.contains(&id));
    }

    #[test]
    fn closed_receiver_counts_as_no_stream() {
        let registry = SessionRegistry::new();
        let id = registry.create(TransportKind::Sse);
        let (tx, rx) = mpsc::unbounded_channel();
        registry.attach_stream(&id, tx).unwrap();
        drop(rx);

        assert!(registry.stream_sender(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_closes_streams() {
        let registry = SessionRegistry::new();
        let id = registry.create(TransportKind::Sse);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach_stream(&id, tx).unwrap();

        assert_eq!(registry.clear(), 1);
        assert_eq!(registry.count(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn idle_sessions_without_streams_are_evicted() {
        let registry = SessionRegistry::new();
        let max_idle = Duration::from_secs(60);
        let idle = registry.create(TransportKind::Streamable);
        let streaming = registry.create(TransportKind::Streamable);
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.attach_stream(&streaming, tx).unwrap();

        assert_eq!(registry.evict_idle_at(Instant::now(), max_idle), 0);

        let later = Instant::now() + max_idle * 2;
        assert_eq!(registry.evict_idle_at(later, max_idle), 1);
        assert!(!registry.contains(&idle));
        assert!(registry.contains(&streaming));
    }

    #[test]
    fn use_resets_the_idle_clock() {
        let registry = SessionRegistry::new();
        let max_idle = Duration::from_secs(60);
        let id = registry.create(TransportKind::Streamable);
        let created = Instant::now();

        std::thread::sleep(Duration::from_millis(20));
        let (same, created_new) = registry.resolve_or_create(Some(&id), TransportKind::Streamable);
        assert_eq!(same, id);
        assert!(!created_new);

        // Idle for exactly max_idle since creation, but touched after that.
        assert_eq!(registry.evict_idle_at(created + max_idle, max_idle), 0);
        assert!(registry.contains(&id));
    }

    #[test]
    fn closed_stream_does_not_keep_a_session_alive() {
        let registry = SessionRegistry::new();
        let id = registry.create(TransportKind::Sse);
        let (tx, rx) = mpsc::unbounded_channel();
        registry.attach_stream(&id, tx).unwrap();
        drop(rx);

        let max_idle = Duration::from_secs(1);
        assert_eq!(registry.evict_idle_at(Instant::now() + max_idle * 2, max_idle), 1);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn attach_to_unknown_session_fails() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(registry.attach_stream("nope", tx).is_err());
    }
}
