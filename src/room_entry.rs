//! Room entry: join or create a room before chatting.
//!
//! DESIGN
//! ======
//! `RoomEntry` owns the two-field form and talks to the room service
//! through `RoomApi`. A successful join or create populates the shared
//! `SessionStore` and tells the caller to move to the chat view. Nothing is
//! written to the session on failure.
//!
//! ERROR HANDLING
//! ==============
//! Every failure is terminal for that attempt and carries the message the
//! user should see. Bad-request class failures from join surface the
//! server's own text; all other HTTP and transport failures collapse to a
//! generic message per operation. No retries.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ApiError, RoomApi};
use crate::app::View;
use crate::session::SessionStore;

pub const JOINED_NOTICE: &str = "joined..";
pub const CREATED_NOTICE: &str = "Room Created Successfully !!";

#[derive(Debug, thiserror::Error)]
pub enum RoomEntryError {
    #[error("Invalid Input !!")]
    InvalidInput,
    #[error("{0}")]
    JoinRejected(String),
    #[error("Error in joining room")]
    JoinFailed(#[source] ApiError),
    #[error("Room already exists !!")]
    RoomExists,
    #[error("Error in creating room")]
    CreateFailed(#[source] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    RoomId,
    UserName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryForm {
    pub room_id: String,
    pub user_name: String,
}

/// Successful join or create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entered {
    /// Room id as confirmed by the server.
    pub room_id: String,
    pub notice: &'static str,
    pub view: View,
}

pub struct RoomEntry {
    form: EntryForm,
    api: Arc<dyn RoomApi>,
    session: SessionStore,
}

impl RoomEntry {
    #[must_use]
    pub fn new(api: Arc<dyn RoomApi>, session: SessionStore) -> Self {
        Self { form: EntryForm::default(), api, session }
    }

    #[must_use]
    pub fn form(&self) -> &EntryForm {
        &self.form
    }

    pub fn update_field(&mut self, field: Field, value: &str) {
        match field {
            Field::RoomId => value.clone_into(&mut self.form.room_id),
            Field::UserName => value.clone_into(&mut self.form.user_name),
        }
    }

    /// Both fields must be non-empty. Whitespace counts as content.
    ///
    /// # Errors
    ///
    /// Returns [`RoomEntryError::InvalidInput`] when either field is empty.
    pub fn validate(&self) -> Result<(), RoomEntryError> {
        if self.form.room_id.is_empty() || self.form.user_name.is_empty() {
            return Err(RoomEntryError::InvalidInput);
        }
        Ok(())
    }

    /// Join an existing room and populate the session.
    ///
    /// # Errors
    ///
    /// [`RoomEntryError::InvalidInput`] without a network call,
    /// [`RoomEntryError::JoinRejected`] with the server's text on a
    /// bad-request class failure, [`RoomEntryError::JoinFailed`] otherwise.
    pub async fn join_room(&mut self) -> Result<Entered, RoomEntryError> {
        self.validate()?;
        let requested = self.form.room_id.clone();
        match self.api.join_room(&requested).await {
            Ok(room) => Ok(self.enter(&requested, &room.room_id, JOINED_NOTICE)),
            Err(err) if err.is_bad_request() => {
                warn!(room_id = %requested, error = %err, "room entry: join rejected");
                let message = err.server_message().unwrap_or("Error in joining room").to_owned();
                Err(RoomEntryError::JoinRejected(message))
            }
            Err(err) => {
                warn!(room_id = %requested, error = %err, "room entry: join failed");
                Err(RoomEntryError::JoinFailed(err))
            }
        }
    }

    /// Create a new room and populate the session.
    ///
    /// # Errors
    ///
    /// [`RoomEntryError::InvalidInput`] without a network call,
    /// [`RoomEntryError::RoomExists`] on a bad-request class failure,
    /// [`RoomEntryError::CreateFailed`] otherwise.
    pub async fn create_room(&mut self) -> Result<Entered, RoomEntryError> {
        self.validate()?;
        let requested = self.form.room_id.clone();
        match self.api.create_room(&requested).await {
            Ok(room) => Ok(self.enter(&requested, &room.room_id, CREATED_NOTICE)),
            Err(err) if err.is_bad_request() => {
                warn!(room_id = %requested, error = %err, "room entry: room already exists");
                Err(RoomEntryError::RoomExists)
            }
            Err(err) => {
                warn!(room_id = %requested, error = %err, "room entry: create failed");
                Err(RoomEntryError::CreateFailed(err))
            }
        }
    }

    fn enter(&self, requested: &str, confirmed: &str, notice: &'static str) -> Entered {
        let room_id = if confirmed.is_empty() { requested } else { confirmed };
        self.session.establish(room_id, &self.form.user_name);
        info!(%room_id, user = %self.form.user_name, "room entry: entered room");
        Entered { room_id: room_id.to_owned(), notice, view: View::Chat }
    }
}

#[cfg(test)]
#[path = "room_entry_test.rs"]
mod tests;
