//! Wire models shared by the REST client and the realtime connection.
//!
//! Field names follow the server's camelCase JSON. Timestamps stay raw
//! strings: the server emits offset-naive UTC and the client only ever
//! renders them (see [`crate::util::time_ago`]).

use serde::{Deserialize, Serialize};

/// A single chat message, from history or from the live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    /// Absent on broker echoes; defaults to empty.
    #[serde(default)]
    pub room_id: String,
    /// Naive UTC timestamp, e.g. `2024-01-01T00:00:00`. Empty on outgoing
    /// messages; the server stamps them.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time_stamp: String,
}

impl ChatMessage {
    /// Outgoing message as published to the room's send destination.
    #[must_use]
    pub fn outgoing(sender: &str, content: &str, room_id: &str) -> Self {
        Self {
            sender: sender.to_owned(),
            content: content.to_owned(),
            room_id: room_id.to_owned(),
            time_stamp: String::new(),
        }
    }
}

/// Room as confirmed by the join/create endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Subscription destination for a room's live messages.
#[must_use]
pub fn topic_destination(room_id: &str) -> String {
    format!("/topic/room/{room_id}")
}

/// Application destination that accepts a room's outgoing messages.
#[must_use]
pub fn send_destination(room_id: &str) -> String {
    format!("/app/sendMessage/{room_id}")
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
