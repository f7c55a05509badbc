//! Batch session registry and keepalive-aware event streaming.
//!
//! Starting a session spawns the worker task and returns a session id
//! immediately; the event stream is claimed separately and consumed until
//! a terminal event. There is no cancellation API: an unconsumed session's
//! worker runs to completion and its channel fills and drops events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::types::BatchEvent;

/// Channel capacity per session. Workers use `send().await`, so a stalled
/// consumer applies backpressure rather than dropping events.
const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Opaque batch session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Holds pending event receivers until a consumer claims them.
#[derive(Default, Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<SessionId, mpsc::Receiver<BatchEvent>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session: returns its id, the sender handed to the
    /// worker, and stores the receiver for a later `claim`.
    pub async fn open(&self) -> (SessionId, mpsc::Sender<BatchEvent>) {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let id = SessionId(Uuid::new_v4());
        self.inner.lock().await.insert(id, rx);
        (id, tx)
    }

    /// Claim the event stream for a session. Each stream can be claimed
    /// exactly once.
    pub async fn claim(&self, id: SessionId, keepalive: Duration) -> Option<EventStream> {
        let rx = self.inner.lock().await.remove(&id)?;
        Some(EventStream {
            rx,
            keepalive,
            finished: false,
        })
    }
}

/// Sequential event consumer with heartbeat injection.
pub struct EventStream {
    rx: mpsc::Receiver<BatchEvent>,
    keepalive: Duration,
    finished: bool,
}

impl EventStream {
    /// Next event; `Keepalive` when idle past the heartbeat interval, and
    /// `None` once a terminal event has been delivered or the worker is
    /// gone.
    pub async fn next(&mut self) -> Option<BatchEvent> {
        if self.finished {
            return None;
        }
        match tokio::time::timeout(self.keepalive, self.rx.recv()).await {
            Ok(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(_) => Some(BatchEvent::Keepalive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_ends_after_terminal_event() {
        let registry = SessionRegistry::new();
        let (id, tx) = registry.open().await;

        tx.send(BatchEvent::status("working")).await.unwrap();
        tx.send(BatchEvent::Error {
            message: "bad".into(),
        })
        .await
        .unwrap();
        tx.send(BatchEvent::status("after terminal")).await.unwrap();

        let mut stream = registry.claim(id, Duration::from_secs(5)).await.unwrap();
        assert!(matches!(stream.next().await, Some(BatchEvent::Status { .. })));
        assert!(matches!(stream.next().await, Some(BatchEvent::Error { .. })));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_keepalive_on_idle() {
        let registry = SessionRegistry::new();
        let (id, _tx) = registry.open().await;

        let mut stream = registry.claim(id, Duration::from_millis(10)).await.unwrap();
        assert!(matches!(stream.next().await, Some(BatchEvent::Keepalive)));
    }

    #[tokio::test]
    async fn test_claim_is_single_use() {
        let registry = SessionRegistry::new();
        let (id, _tx) = registry.open().await;

        assert!(registry.claim(id, Duration::from_secs(1)).await.is_some());
        assert!(registry.claim(id, Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_stream_ends_when_worker_drops_channel() {
        let registry = SessionRegistry::new();
        let (id, tx) = registry.open().await;
        drop(tx);

        let mut stream = registry.claim(id, Duration::from_secs(5)).await.unwrap();
        assert!(stream.next().await.is_none());
    }
}
