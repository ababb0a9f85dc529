//! Session context: active room, current user, and connected flag.
//!
//! DESIGN
//! ======
//! `SessionStore` is a cloneable handle passed explicitly to the room entry
//! and the chat session; there is no ambient global. Every mutation goes
//! through a `watch` channel, so any holder can subscribe and react to
//! changes the way a UI re-renders.
//!
//! INVARIANT
//! =========
//! `connected == true` implies both `room_id` and `current_user` are
//! non-empty. Setters that would break it either refuse (`set_connected`)
//! or drop the flag (`set_room_id("")`, `set_current_user("")`).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub room_id: String,
    pub current_user: String,
    pub connected: bool,
}

impl Session {
    /// Both identity fields are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.room_id.is_empty() && !self.current_user.is_empty()
    }
}

/// Shared handle to the process session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn room_id(&self) -> String {
        self.tx.borrow().room_id.clone()
    }

    #[must_use]
    pub fn current_user(&self) -> String {
        self.tx.borrow().current_user.clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.tx.borrow().connected
    }

    /// Receiver notified on every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub fn set_room_id(&self, room_id: &str) {
        self.tx.send_modify(|session| {
            session.room_id = room_id.to_owned();
            if session.room_id.is_empty() {
                session.connected = false;
            }
        });
    }

    pub fn set_current_user(&self, user: &str) {
        self.tx.send_modify(|session| {
            session.current_user = user.to_owned();
            if session.current_user.is_empty() {
                session.connected = false;
            }
        });
    }

    /// Set the connected flag. Returns `false` and leaves the session
    /// untouched when asked to connect an incomplete session.
    pub fn set_connected(&self, connected: bool) -> bool {
        let mut applied = true;
        self.tx.send_if_modified(|session| {
            if connected && !session.is_complete() {
                applied = false;
                return false;
            }
            session.connected = connected;
            true
        });
        if !applied {
            debug!("session: refused to mark incomplete session connected");
        }
        applied
    }

    /// Populate room, user, and connected flag in one notification.
    pub fn establish(&self, room_id: &str, user: &str) -> bool {
        let mut applied = false;
        self.tx.send_modify(|session| {
            session.room_id = room_id.to_owned();
            session.current_user = user.to_owned();
            session.connected = session.is_complete();
            applied = session.connected;
        });
        applied
    }

    /// Reset to the empty, disconnected session.
    pub fn clear(&self) {
        self.tx.send_modify(|session| *session = Session::default());
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
