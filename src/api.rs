//! Room service REST client.
//!
//! DESIGN
//! ======
//! `RoomApi` is the seam between the chat flow and the HTTP service, so room
//! entry and chat session are tested against in-memory mocks. `HttpRoomApi`
//! is the `reqwest` implementation against `/api/v1/rooms`.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses keep their status and raw body: room entry shows the
//! body verbatim for bad-request class failures, and a generic message for
//! everything else.

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::model::{ChatMessage, Room};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Bad-request class failure: the server understood and refused the
    /// room operation (unknown room on join, duplicate room on create).
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::Status { status: 400 | 409, .. })
    }

    /// Error text supplied by the server, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body.trim()).filter(|b| !b.is_empty()),
            _ => None,
        }
    }
}

/// Provider-neutral room service. Enables mocking in tests.
#[async_trait::async_trait]
pub trait RoomApi: Send + Sync {
    /// Stored messages for a room, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure or non-2xx status.
    async fn fetch_history(&self, room_id: &str) -> Result<Vec<ChatMessage>, ApiError>;

    /// Confirm an existing room.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] with 400 when the room does not exist.
    async fn join_room(&self, room_id: &str) -> Result<Room, ApiError>;

    /// Create a new room.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] with 400 when the room already exists.
    async fn create_room(&self, room_id: &str) -> Result<Room, ApiError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

pub struct HttpRoomApi {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl HttpRoomApi {
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            page_size: config.history_page_size,
        })
    }

    /// `{base}/api/v1/rooms/{segments...}` with each segment percent-encoded.
    fn rooms_url(&self, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "v1", "rooms"])
            .extend(segments);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl RoomApi for HttpRoomApi {
    async fn fetch_history(&self, room_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let url = self.rooms_url(&[room_id, "messages"])?;
        debug!(%room_id, %url, "api: fetch history");
        let response = self
            .client
            .get(url)
            .query(&[("size", self.page_size.to_string()), ("page", "0".to_owned())])
            .send()
            .await?;
        read_json(response).await
    }

    async fn join_room(&self, room_id: &str) -> Result<Room, ApiError> {
        let url = self.rooms_url(&[room_id])?;
        debug!(%room_id, %url, "api: join room");
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    async fn create_room(&self, room_id: &str) -> Result<Room, ApiError> {
        let url = self.rooms_url(&[])?;
        debug!(%room_id, %url, "api: create room");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(room_id.to_owned())
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status: status.as_u16(), body });
    }
    Ok(response.json::<T>().await?)
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::sync::Mutex;

    /// In-memory room service. Every call is recorded as `"op:room"`.
    #[derive(Default)]
    pub struct MockRoomApi {
        pub history: Vec<ChatMessage>,
        /// When set, every call fails with this status and body.
        pub failure: Option<(u16, String)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl MockRoomApi {
        #[must_use]
        pub fn with_history(history: Vec<ChatMessage>) -> Self {
            Self { history, ..Self::default() }
        }

        #[must_use]
        pub fn failing(status: u16, body: &str) -> Self {
            Self { failure: Some((status, body.to_owned())), ..Self::default() }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, op: &str, room_id: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(format!("{op}:{room_id}"));
            match &self.failure {
                Some((status, body)) => Err(ApiError::Status { status: *status, body: body.clone() }),
                None => Ok(()),
            }
        }
    }

    #[async_trait::async_trait]
    impl RoomApi for MockRoomApi {
        async fn fetch_history(&self, room_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
            self.record("history", room_id)?;
            Ok(self.history.clone())
        }

        async fn join_room(&self, room_id: &str) -> Result<Room, ApiError> {
            self.record("join", room_id)?;
            Ok(Room { room_id: room_id.to_owned(), messages: Vec::new() })
        }

        async fn create_room(&self, room_id: &str) -> Result<Room, ApiError> {
            self.record("create", room_id)?;
            Ok(Room { room_id: room_id.to_owned(), messages: Vec::new() })
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
