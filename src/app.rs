//! Top-level navigation and terminal input for the chat screen.

/// Screen the terminal front end should show next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Join or create a room.
    RoomEntry,
    /// Live chat in the session's room.
    Chat,
}

/// One line typed on the chat screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Message(&'a str),
    /// `/room <id>`
    ChangeRoom(&'a str),
    /// `/logout`
    Logout,
}

impl<'a> ChatInput<'a> {
    /// Slash commands are recognised only at the start of the line; anything
    /// else, including `/room` with no id, is sent as typed.
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed == "/logout" {
            return Self::Logout;
        }
        if let Some(room_id) = trimmed.strip_prefix("/room ") {
            let room_id = room_id.trim();
            if !room_id.is_empty() {
                return Self::ChangeRoom(room_id);
            }
        }
        Self::Message(line)
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
