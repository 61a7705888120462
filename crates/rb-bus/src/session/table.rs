//! Session table implementation

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rb_protocol::SessionId;

use super::link::SessionLink;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, handshake not finished
    Connecting,
    /// Handshake completed
    Online,
    /// Closed; a new connection creates a new session
    Offline,
}

/// One open session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// Address or name of the remote endpoint
    pub peer: String,
    pub state: SessionState,
    pub link: SessionLink,
    pub connected_at: Instant,
}

/// Outcome of removing a session from the table
#[derive(Debug, Clone)]
pub struct SessionClosed {
    pub id: SessionId,
    /// Whether the session had reached Online (and so owes an offline callback)
    pub was_online: bool,
    /// No Online session remains after this one
    pub is_last: bool,
    pub link: SessionLink,
}

/// Tracks the open sessions of one endpoint.
///
/// Identifiers come from a counter starting at 1; 0 is never handed out and
/// a wrapped counter skips identifiers that are still open. Transitions that
/// report first/last flags take the same lock as the online count, so the
/// flags always describe the state right after the transition.
pub struct SessionTable {
    sessions: DashMap<SessionId, Session>,
    next_id: AtomicU32,
    /// Number of Online sessions; also serialises transitions
    online: Mutex<usize>,
}

impl SessionTable {
    /// Create an empty session table
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU32::new(1),
            online: Mutex::new(0),
        }
    }

    /// Register a new session in the Connecting state
    pub fn on_connect(&self, peer: impl Into<String>, link: SessionLink) -> SessionId {
        let _guard = self.online.lock();
        self.insert(peer.into(), link)
    }

    /// Register a new session if `admit` accepts the current session count.
    ///
    /// Returns the current session count when it is refused.
    pub fn try_connect(
        &self,
        peer: impl Into<String>,
        link: SessionLink,
        admit: impl FnOnce(usize) -> bool,
    ) -> Result<SessionId, usize> {
        let _guard = self.online.lock();
        let open = self.sessions.len();
        if !admit(open) {
            return Err(open);
        }
        Ok(self.insert(peer.into(), link))
    }

    fn insert(&self, peer: String, link: SessionLink) -> SessionId {
        loop {
            let id = SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            if id == SessionId::INVALID {
                continue;
            }
            if let Entry::Vacant(slot) = self.sessions.entry(id) {
                slot.insert(Session {
                    id,
                    peer,
                    state: SessionState::Connecting,
                    link,
                    connected_at: Instant::now(),
                });
                tracing::debug!("Registered {}", id);
                return id;
            }
        }
    }

    /// Move a session from Connecting to Online.
    ///
    /// Returns `Some(is_first)` on success, `None` when the session is
    /// unknown or not Connecting.
    pub fn mark_online(&self, id: SessionId) -> Option<bool> {
        let mut online = self.online.lock();
        let mut session = self.sessions.get_mut(&id)?;
        if session.state != SessionState::Connecting {
            tracing::warn!("{} cannot go online from {:?}", id, session.state);
            return None;
        }
        session.state = SessionState::Online;
        *online += 1;
        Some(*online == 1)
    }

    /// Remove a session.
    ///
    /// The caller that gets `Some` owns the offline cascade for the session.
    /// Unknown sessions are a no-op.
    pub fn on_disconnect(&self, id: SessionId) -> Option<SessionClosed> {
        let mut online = self.online.lock();
        let Some((_, mut session)) = self.sessions.remove(&id) else {
            tracing::warn!("Disconnect for unknown {}", id);
            return None;
        };

        let was_online = session.state == SessionState::Online;
        if was_online {
            *online = online.saturating_sub(1);
        }
        session.state = SessionState::Offline;

        Some(SessionClosed {
            id,
            was_online,
            is_last: *online == 0,
            link: session.link,
        })
    }

    /// Exactly one session is Online
    pub fn is_first_session(&self) -> bool {
        *self.online.lock() == 1
    }

    /// No session is Online
    pub fn is_last_session(&self) -> bool {
        *self.online.lock() == 0
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Outbound link of a session
    pub fn link(&self, id: SessionId) -> Option<SessionLink> {
        self.sessions.get(&id).map(|r| r.link.clone())
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.sessions.get(&id).map(|r| r.state)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Identifiers of every open session, sorted
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|r| *r.key()).collect();
        ids.sort();
        ids
    }

    /// Identifiers of the Online sessions, sorted
    pub fn online_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|r| r.state == SessionState::Online)
            .map(|r| *r.key())
            .collect();
        ids.sort();
        ids
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
