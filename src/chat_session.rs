//! Chat session: history, live subscription, sending, and logout for the
//! session's current room.
//!
//! DESIGN
//! ======
//! `ChatSession` is driven by a single task (the terminal loop). It owns the
//! message list and at most one `Connection`. History is fetched before the
//! connection is opened, so stored messages always precede live ones and
//! the list has exactly one writer.
//!
//! LIFECYCLE
//! =========
//! 1. mount: reset, then Guarded (session not connected, redirect) or Loading
//! 2. Loading: fetch history once, then open the connection → Live
//! 3. Live: next_message / drain_pending append, send_message publishes
//! 4. change_room: close the old connection, then open the new one
//! 5. logout: Closing → close connection, clear session → Closed
//!
//! ERROR HANDLING
//! ==============
//! A failed history fetch is reported in `HistoryOutcome::Failed` and the
//! list stays empty; the session still goes live. Connection failures are
//! returned as `ChatSessionError::Connect`. Sending or logging out without a
//! connection is a no-op.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ApiError, RoomApi};
use crate::app::View;
use crate::model::ChatMessage;
use crate::net::{Connection, ConnectionError, Connector};
use crate::session::SessionStore;

pub const CONNECTED_NOTICE: &str = "Connected to chat";

#[derive(Debug, thiserror::Error)]
pub enum ChatSessionError {
    #[error("could not connect to chat: {0}")]
    Connect(#[source] ConnectionError),
    #[error("could not send message: {0}")]
    Publish(#[source] ConnectionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not mounted, or mounted without a connected session.
    Guarded,
    Loading,
    Live,
    Closing,
    Closed,
}

#[derive(Debug)]
pub enum HistoryOutcome {
    /// Number of stored messages appended.
    Loaded(usize),
    Failed(ApiError),
}

#[derive(Debug)]
pub enum Mounted {
    Redirect(View),
    Live { history: HistoryOutcome, notice: &'static str },
}

pub struct ChatSession {
    session: SessionStore,
    api: Arc<dyn RoomApi>,
    connector: Arc<dyn Connector>,
    phase: Phase,
    messages: Vec<ChatMessage>,
    input: String,
    connection: Option<Connection>,
}

impl ChatSession {
    #[must_use]
    pub fn new(session: SessionStore, api: Arc<dyn RoomApi>, connector: Arc<dyn Connector>) -> Self {
        Self {
            session,
            api,
            connector,
            phase: Phase::Guarded,
            messages: Vec::new(),
            input: String::new(),
            connection: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: &str) {
        value.clone_into(&mut self.input);
    }

    /// A connection exists and its driver is still running.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_live)
    }

    /// Enter the chat view. Mounting again starts a fresh visit: any open
    /// connection is closed and the list is rebuilt from history.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSessionError::Connect`] if the realtime connection
    /// cannot be opened. History failures are not errors.
    pub async fn mount(&mut self) -> Result<Mounted, ChatSessionError> {
        self.close_connection().await;
        self.messages.clear();
        if !self.session.is_connected() {
            self.phase = Phase::Guarded;
            debug!("chat: session not connected; redirecting to room entry");
            return Ok(Mounted::Redirect(View::RoomEntry));
        }

        self.phase = Phase::Loading;
        let room_id = self.session.room_id();
        let history = self.load_history(&room_id).await;
        self.connect(&room_id).await?;
        Ok(Mounted::Live { history, notice: CONNECTED_NOTICE })
    }

    /// Fetch stored messages and append them. Only `mount` calls this, on a
    /// cleared list.
    async fn load_history(&mut self, room_id: &str) -> HistoryOutcome {
        match self.api.fetch_history(room_id).await {
            Ok(history) => {
                let count = history.len();
                self.messages.extend(history);
                info!(%room_id, count, "chat: history loaded");
                HistoryOutcome::Loaded(count)
            }
            Err(e) => {
                warn!(%room_id, error = %e, "chat: history fetch failed");
                HistoryOutcome::Failed(e)
            }
        }
    }

    /// Open the realtime connection for `room_id`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSessionError::Connect`] if the connection cannot be opened.
    pub async fn connect(&mut self, room_id: &str) -> Result<(), ChatSessionError> {
        self.close_connection().await;
        match self.connector.open(room_id).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.phase = Phase::Live;
                info!(%room_id, "chat: live");
                Ok(())
            }
            Err(e) => {
                warn!(%room_id, error = %e, "chat: connect failed");
                self.phase = Phase::Closed;
                Err(ChatSessionError::Connect(e))
            }
        }
    }

    /// Publish the current input. Returns `Ok(false)` without side effects
    /// unless the connection is live, the session is connected, and the
    /// input has visible content. The message is not appended locally; it
    /// arrives through the subscription like everyone else's.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSessionError::Publish`] if the connection refuses the
    /// message; the input is kept.
    pub fn send_message(&mut self) -> Result<bool, ChatSessionError> {
        let Some(connection) = self.connection.as_ref().filter(|c| c.is_live()) else {
            debug!("chat: send skipped; no live connection");
            return Ok(false);
        };
        if !self.session.is_connected() || self.input.trim().is_empty() {
            return Ok(false);
        }

        let snapshot = self.session.snapshot();
        let message = ChatMessage::outgoing(&snapshot.current_user, &self.input, &snapshot.room_id);
        connection.publish(message).map_err(ChatSessionError::Publish)?;
        self.input.clear();
        debug!(room_id = %snapshot.room_id, "chat: message published");
        Ok(true)
    }

    /// Wait for the next live message and append it. `None` once there is
    /// no connection or its stream has ended.
    pub async fn next_message(&mut self) -> Option<ChatMessage> {
        let connection = self.connection.as_mut()?;
        let Some(message) = connection.next_message().await else {
            info!(room_id = %connection.room_id(), "chat: live stream ended");
            return None;
        };
        self.messages.push(message.clone());
        Some(message)
    }

    /// Append every message already delivered. Returns how many were added.
    pub fn drain_pending(&mut self) -> usize {
        let Some(connection) = self.connection.as_mut() else {
            return 0;
        };
        let mut added = 0;
        while let Some(message) = connection.try_next_message() {
            self.messages.push(message);
            added += 1;
        }
        added
    }

    /// Switch the session to another room. The old connection is fully
    /// closed before the new one opens; the message list is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSessionError::Connect`] if the new room's connection
    /// cannot be opened.
    pub async fn change_room(&mut self, room_id: &str) -> Result<(), ChatSessionError> {
        let unchanged = self.connection.as_ref().is_some_and(|c| c.room_id() == room_id && c.is_live());
        self.session.set_room_id(room_id);
        if unchanged {
            return Ok(());
        }

        self.close_connection().await;
        if !self.session.is_connected() {
            self.phase = Phase::Guarded;
            return Ok(());
        }
        info!(%room_id, "chat: changing room");
        self.connect(room_id).await
    }

    /// Leave the chat: close the connection, reset the session, and send the
    /// user back to room entry.
    pub async fn logout(&mut self) -> View {
        self.phase = Phase::Closing;
        self.close_connection().await;
        self.session.clear();
        self.phase = Phase::Closed;
        info!("chat: logged out");
        View::RoomEntry
    }

    async fn close_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

#[cfg(test)]
#[path = "chat_session_test.rs"]
mod tests;
