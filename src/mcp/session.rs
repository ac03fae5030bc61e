use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::errors::SessionClosed;
use super::sse::SseEvent;

/// Sending half of a session's event channel.
pub type Outbound = mpsc::UnboundedSender<SseEvent>;

/// Opaque session token handed to the client in the endpoint event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// MCP Session state management
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    outbound: Outbound,
}

impl Session {
    /// Push an event to the client holding this session's event stream
    pub fn send(&self, event: SseEvent) -> Result<(), SessionClosed> {
        self.outbound
            .send(event)
            .map_err(|_| SessionClosed(self.id.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Table of open sessions.
///
/// An id present here always has a live event stream behind it. The lock
/// is only ever held for a map operation, never across an await.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session delivering to `outbound`
    pub fn create(&self, outbound: Outbound) -> SessionId {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        let mut id = SessionId::new();
        while sessions.contains_key(&id) {
            id = SessionId::new();
        }

        sessions.insert(
            id,
            Session {
                id,
                created_at: Utc::now(),
                outbound,
            },
        );
        tracing::debug!(session_id = %id, open_sessions = sessions.len(), "Session opened");

        id
    }

    /// Look up an open session.
    ///
    /// The returned handle is a snapshot; after any await point, look the
    /// session up again before relying on it.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()?;

        // the stream went away but its guard has not run yet
        if session.is_closed() {
            self.remove(id);
            return None;
        }

        Some(session)
    }

    /// Close a session. Returns whether it was still open; closing twice is
    /// harmless.
    pub fn remove(&self, id: &SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        if let Some(session) = &removed {
            let lifetime = Utc::now() - session.created_at;
            tracing::debug!(
                session_id = %id,
                lifetime_ms = lifetime.num_milliseconds(),
                "Session removed"
            );
        }

        removed.is_some()
    }

    /// Drop every session, ending all open event streams. Returns how many
    /// were open.
    pub fn close_all(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let count = sessions.len();
        sessions.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
