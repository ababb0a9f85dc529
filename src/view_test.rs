use super::*;
use time::macros::datetime;

fn message(sender: &str, time_stamp: &str) -> ChatMessage {
    ChatMessage {
        sender: sender.to_owned(),
        content: "hi".to_owned(),
        room_id: "abc123".to_owned(),
        time_stamp: time_stamp.to_owned(),
    }
}

#[test]
fn renders_sender_content_and_age() {
    let now = datetime!(2024-01-01 00:02:00 UTC);
    let line = render_message(&message("bob", "2024-01-01T00:00:00"), "alice", now);
    assert_eq!(line, "[bob] hi (2 minutes ago)");
}

#[test]
fn marks_own_messages() {
    let now = datetime!(2024-01-01 00:00:10 UTC);
    let line = render_message(&message("alice", "2024-01-01T00:00:00"), "alice", now);
    assert_eq!(line, "[alice (you)] hi (10 seconds ago)");
}

#[test]
fn omits_age_without_timestamp() {
    let now = datetime!(2024-01-01 00:00:00 UTC);
    assert_eq!(render_message(&message("bob", ""), "alice", now), "[bob] hi");
}

#[test]
fn header_names_room_and_user() {
    assert_eq!(render_header("abc123", "alice"), "== room abc123 as alice ==");
}
