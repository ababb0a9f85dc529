use super::*;
use crate::api::test_helpers::MockRoomApi;
use crate::net::connection::test_helpers::MockConnector;
use std::time::Duration;
use tokio::time::timeout;

fn message(sender: &str, content: &str) -> ChatMessage {
    ChatMessage {
        sender: sender.to_owned(),
        content: content.to_owned(),
        room_id: "abc123".to_owned(),
        time_stamp: "2024-01-01T00:00:00".to_owned(),
    }
}

struct Harness {
    chat: ChatSession,
    api: Arc<MockRoomApi>,
    connector: Arc<MockConnector>,
    session: SessionStore,
}

fn harness(api: MockRoomApi, connector: MockConnector) -> Harness {
    let api = Arc::new(api);
    let connector = Arc::new(connector);
    let session = SessionStore::new();
    let chat = ChatSession::new(session.clone(), api.clone(), connector.clone());
    Harness { chat, api, connector, session }
}

async fn next(chat: &mut ChatSession) -> Option<ChatMessage> {
    timeout(Duration::from_secs(1), chat.next_message())
        .await
        .expect("next message timed out")
}

// =========================================================================
// mount
// =========================================================================

#[tokio::test]
async fn mount_without_connected_session_redirects_without_calls() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());

    let mounted = h.chat.mount().await.expect("mount");
    assert!(matches!(mounted, Mounted::Redirect(View::RoomEntry)));
    assert_eq!(h.chat.phase(), Phase::Guarded);
    assert!(h.api.calls().is_empty());
    assert!(h.connector.events().is_empty());
}

#[tokio::test]
async fn history_precedes_live_messages() {
    let history = vec![message("alice", "one"), message("bob", "two")];
    let mut h = harness(MockRoomApi::with_history(history), MockConnector::default());
    h.session.establish("abc123", "alice");

    let mounted = h.chat.mount().await.expect("mount");
    let Mounted::Live { history, notice } = mounted else {
        panic!("expected live mount");
    };
    assert!(matches!(history, HistoryOutcome::Loaded(2)));
    assert_eq!(notice, "Connected to chat");
    assert_eq!(h.chat.phase(), Phase::Live);
    assert_eq!(h.api.calls(), vec!["history:abc123"]);
    assert_eq!(h.connector.events(), vec!["open:abc123"]);

    h.connector.deliver("abc123", message("bob", "hi"));
    assert_eq!(next(&mut h.chat).await.expect("live").content, "hi");

    let messages = h.chat.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].sender, "bob");
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "hi"]);
}

#[tokio::test]
async fn history_failure_is_reported_and_session_still_goes_live() {
    let mut h = harness(MockRoomApi::failing(500, "boom"), MockConnector::default());
    h.session.establish("abc123", "alice");

    let mounted = h.chat.mount().await.expect("mount");
    assert!(matches!(
        mounted,
        Mounted::Live { history: HistoryOutcome::Failed(ApiError::Status { status: 500, .. }), .. }
    ));
    assert!(h.chat.messages().is_empty());
    assert!(h.chat.is_live());
}

#[tokio::test]
async fn connect_failure_is_returned() {
    let mut h = harness(MockRoomApi::default(), MockConnector::rejecting("bad login"));
    h.session.establish("abc123", "alice");

    let err = h.chat.mount().await.expect_err("connect should fail");
    assert!(matches!(err, ChatSessionError::Connect(ConnectionError::Rejected(_))));
    assert!(!h.chat.is_live());
    assert_eq!(h.chat.phase(), Phase::Closed);
}

#[tokio::test]
async fn logout_after_failed_mount_resets_session() {
    let mut h = harness(MockRoomApi::default(), MockConnector::rejecting("bad login"));
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect_err("connect should fail");

    assert_eq!(h.chat.logout().await, View::RoomEntry);
    assert_eq!(h.chat.phase(), Phase::Closed);
    assert_eq!(h.session.snapshot(), crate::session::Session::default());
    assert!(h.connector.events().is_empty());
}

#[tokio::test]
async fn drain_pending_appends_in_arrival_order() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    for content in ["a", "b", "c"] {
        h.connector.deliver("abc123", message("bob", content));
    }
    assert_eq!(h.chat.drain_pending(), 3);
    assert_eq!(h.chat.drain_pending(), 0);
    let contents: Vec<&str> = h.chat.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn mounting_again_rebuilds_from_history_without_duplicates() {
    let mut h = harness(MockRoomApi::with_history(vec![message("alice", "one")]), MockConnector::default());
    h.session.establish("abc123", "alice");

    h.chat.mount().await.expect("first mount");
    h.connector.deliver("abc123", message("bob", "live"));
    assert_eq!(h.chat.drain_pending(), 1);

    h.chat.mount().await.expect("second mount");
    let contents: Vec<&str> = h.chat.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one"]);
    assert_eq!(h.connector.events(), vec!["open:abc123", "close:abc123", "open:abc123"]);
    assert!(h.chat.is_live());
}

// =========================================================================
// send_message
// =========================================================================

#[tokio::test]
async fn send_publishes_raw_input_and_does_not_append() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    h.chat.set_input("  hello  ");
    assert!(h.chat.send_message().expect("send"));
    assert_eq!(h.chat.input(), "");
    assert!(h.chat.messages().is_empty());

    // Close waits on the driver, so every queued publish has been recorded.
    h.chat.logout().await;
    assert_eq!(h.connector.published(), vec![ChatMessage::outgoing("alice", "  hello  ", "abc123")]);
}

#[tokio::test]
async fn sent_message_appears_once_after_echo() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    h.chat.set_input("hello");
    assert!(h.chat.send_message().expect("send"));
    assert!(h.chat.messages().is_empty());

    // The broker fans the published message back out on the room topic.
    h.connector.deliver("abc123", ChatMessage::outgoing("alice", "hello", "abc123"));
    let received = next(&mut h.chat).await.expect("echo");
    assert_eq!(received.sender, "alice");
    assert_eq!(received.content, "hello");
    assert_eq!(h.chat.drain_pending(), 0);
    assert_eq!(h.chat.messages().len(), 1);

    h.chat.logout().await;
    assert_eq!(h.connector.published().len(), 1);
}

#[tokio::test]
async fn blank_input_is_not_sent() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    h.chat.set_input("   ");
    assert!(!h.chat.send_message().expect("send"));
    assert_eq!(h.chat.input(), "   ");

    h.chat.logout().await;
    assert!(h.connector.published().is_empty());
}

#[tokio::test]
async fn send_without_connection_is_a_no_op() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.chat.set_input("hello");
    assert!(!h.chat.send_message().expect("send"));
    assert_eq!(h.chat.input(), "hello");
}

#[tokio::test]
async fn send_after_session_disconnects_is_a_no_op() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    h.session.set_connected(false);
    h.chat.set_input("hello");
    assert!(!h.chat.send_message().expect("send"));

    h.chat.logout().await;
    assert!(h.connector.published().is_empty());
}

// =========================================================================
// change_room / logout
// =========================================================================

#[tokio::test]
async fn change_room_closes_old_connection_before_opening_new() {
    let mut h = harness(MockRoomApi::with_history(vec![message("alice", "old")]), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    h.chat.change_room("xyz").await.expect("change room");
    assert_eq!(h.connector.events(), vec!["open:abc123", "close:abc123", "open:xyz"]);
    assert_eq!(h.session.room_id(), "xyz");
    assert_eq!(h.chat.messages().len(), 1);
    assert!(h.chat.is_live());

    // History is only fetched on mount.
    assert_eq!(h.api.calls(), vec!["history:abc123"]);
}

#[tokio::test]
async fn change_to_same_room_keeps_connection() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    h.chat.change_room("abc123").await.expect("change room");
    assert_eq!(h.connector.events(), vec!["open:abc123"]);
}

#[tokio::test]
async fn logout_closes_connection_and_clears_session() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");
    h.chat.mount().await.expect("mount");

    assert_eq!(h.chat.logout().await, View::RoomEntry);
    assert_eq!(h.chat.phase(), Phase::Closed);
    assert!(!h.chat.is_live());
    assert_eq!(h.connector.events(), vec!["open:abc123", "close:abc123"]);
    assert_eq!(h.session.snapshot(), crate::session::Session::default());
    assert!(h.chat.next_message().await.is_none());
}

#[tokio::test]
async fn logout_without_connection_only_resets_session() {
    let mut h = harness(MockRoomApi::default(), MockConnector::default());
    h.session.establish("abc123", "alice");

    assert_eq!(h.chat.logout().await, View::RoomEntry);
    assert!(h.connector.events().is_empty());
    assert!(!h.session.is_connected());
}
