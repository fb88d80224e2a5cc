//! Session registry and message routing.
//!
//! The transport registers a session per connection together with an
//! outbound channel. Sending only pushes onto that channel; the transport's
//! writer task does the actual I/O, so `send` and `broadcast` never block
//! the calling thread.
//!
//! ```text
//!   script thread ── send(id, text) ──► outbound[id] ──► writer task ──► peer
//!   script thread ── broadcast(text) ─► outbound[*]
//!   reader task ──── deliver(id, text) ──► handler(id, text)
//! ```
//!
//! Delivery is best-effort: unknown ids and peers that went away are
//! silently dropped.

use crate::session::SessionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Outbound half of a session: each string is one text frame.
pub type Outbound = mpsc::UnboundedSender<String>;

/// Receives every inbound `(sender, payload)` pair.
pub type InboundHandler = Arc<dyn Fn(&SessionId, &str) + Send + Sync>;

#[derive(Debug)]
struct Session {
    outbound: Outbound,
    opened_at: Instant,
}

/// Publish/subscribe session registry.
#[derive(Default)]
pub struct EventBus {
    sessions: RwLock<HashMap<SessionId, Session>>,
    handler: RwLock<Option<InboundHandler>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("sessions", &self.session_count())
            .field("has_handler", &self.handler.read().is_some())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session under a fresh identifier.
    pub fn open_session(&self, outbound: Outbound) -> SessionId {
        let id = SessionId::generate();
        self.register(id.clone(), outbound);
        id
    }

    /// Registers a session under a caller-chosen identifier.
    ///
    /// An existing session with the same id is replaced.
    pub fn register(&self, id: SessionId, outbound: Outbound) {
        let session = Session {
            outbound,
            opened_at: Instant::now(),
        };
        let total = {
            let mut sessions = self.sessions.write();
            sessions.insert(id.clone(), session);
            sessions.len()
        };
        debug!(session = %id, total, "Session opened");
    }

    /// Removes a session. Returns `false` if it was already gone.
    pub fn close_session(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(session) => {
                debug!(
                    session = %id,
                    open_ms = u64::try_from(session.opened_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Session closed"
                );
                true
            }
            None => false,
        }
    }

    /// Removes every session. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "All sessions closed");
        }
        drained.len()
    }

    /// Queues `payload` for one session. Unknown or closed sessions are ignored.
    pub fn send(&self, id: &SessionId, payload: &str) {
        let sessions = self.sessions.read();
        match sessions.get(id) {
            Some(session) => {
                if session.outbound.send(payload.to_string()).is_err() {
                    trace!(session = %id, "Send to closing session dropped");
                }
            }
            None => trace!(session = %id, "Send to unknown session dropped"),
        }
    }

    /// Queues `payload` for every open session. Returns how many were targeted.
    pub fn broadcast(&self, payload: &str) -> usize {
        let sessions = self.sessions.read();
        for (id, session) in sessions.iter() {
            if session.outbound.send(payload.to_string()).is_err() {
                trace!(session = %id, "Broadcast to closing session dropped");
            }
        }
        sessions.len()
    }

    /// Installs the inbound handler, replacing any previous one.
    pub fn set_handler(&self, handler: impl Fn(&SessionId, &str) + Send + Sync + 'static) {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Removes the inbound handler; later messages are dropped.
    pub fn clear_handler(&self) {
        *self.handler.write() = None;
    }

    /// Hands an inbound message to the handler.
    ///
    /// The handler runs on the calling (transport) thread, outside any lock.
    pub fn deliver(&self, sender: &SessionId, payload: &str) {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler(sender, payload),
            None => trace!(session = %sender, "Inbound message dropped: no handler"),
        }
    }

    /// Ids of all open sessions, sorted.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_open(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }
}
