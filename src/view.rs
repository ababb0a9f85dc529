//! Plain-text rendering of chat state for the terminal front end.

use time::OffsetDateTime;

use crate::model::ChatMessage;
use crate::util::time_ago::time_ago;

/// One message as `[sender] content (N minutes ago)`. The current user's
/// own messages are tagged `(you)`.
#[must_use]
pub fn render_message(message: &ChatMessage, current_user: &str, now: OffsetDateTime) -> String {
    let who = if message.sender == current_user {
        format!("{} (you)", message.sender)
    } else {
        message.sender.clone()
    };
    if message.time_stamp.is_empty() {
        return format!("[{who}] {}", message.content);
    }
    format!("[{who}] {} ({})", message.content, time_ago(&message.time_stamp, now))
}

/// Header line for the chat screen.
#[must_use]
pub fn render_header(room_id: &str, current_user: &str) -> String {
    format!("== room {room_id} as {current_user} ==")
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
