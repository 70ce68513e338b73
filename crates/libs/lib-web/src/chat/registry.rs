//! # Connection Registry
//!
//! Maps each online participant to its live session. One participant has at
//! most one registered session; a newer session displaces the older one.

use super::protocol::ServerEvent;
use lib_core::ParticipantRef;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events a session may have queued before further pushes are dropped.
pub const OUTBOX_CAPACITY: usize = 256;

/// Outbound side of one live session.
///
/// Pushing never blocks; the session's writer task drains the queue onto the
/// socket. A client that stops reading loses events once the queue is full.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    participant: ParticipantRef,
    tx: mpsc::Sender<ServerEvent>,
}

impl SessionHandle {
    /// New handle plus the queue its writer task drains.
    pub fn new(participant: ParticipantRef) -> (Self, mpsc::Receiver<ServerEvent>) {
        Self::with_capacity(participant, OUTBOX_CAPACITY)
    }

    pub fn with_capacity(participant: ParticipantRef, capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: Uuid::new_v4(),
            participant,
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn participant(&self) -> ParticipantRef {
        self.participant
    }

    /// Queue an event for this session.
    ///
    /// Returns false when the session is gone or its queue is full.
    pub fn push(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    participant = %self.participant,
                    session_id = %self.id,
                    event = event.name(),
                    "[REGISTRY] OUTBOX_FULL participant={} dropped={}",
                    self.participant,
                    event.name()
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<ParticipantRef, SessionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to its participant, returning the session it displaced.
    pub async fn register(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let participant = handle.participant;
        let session_id = handle.id;
        let previous = self.sessions.write().await.insert(participant, handle);

        info!(
            participant = %participant,
            session_id = %session_id,
            replaced = previous.is_some(),
            "[REGISTRY] REGISTER participant={} session_id={}",
            participant,
            session_id
        );
        previous
    }

    /// Remove the binding only if it still points at `handle`'s session.
    ///
    /// A stale session closing after a reconnect must not evict its successor.
    pub async fn unregister_by_session(&self, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = match sessions.get(&handle.participant) {
            Some(current) if current.id == handle.id => {
                sessions.remove(&handle.participant);
                true
            }
            _ => false,
        };

        debug!(
            participant = %handle.participant,
            session_id = %handle.id,
            removed,
            "[REGISTRY] UNREGISTER participant={} session_id={} removed={}",
            handle.participant,
            handle.id,
            removed
        );
        removed
    }

    /// The live session for `participant`, if any.
    pub async fn lookup(&self, participant: &ParticipantRef) -> Option<SessionHandle> {
        self.sessions.read().await.get(participant).cloned()
    }

    pub async fn is_online(&self, participant: &ParticipantRef) -> bool {
        self.sessions.read().await.contains_key(participant)
    }

    pub async fn online_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every binding. Used on shutdown so writer tasks see their queues close.
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }
}
