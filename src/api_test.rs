use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Serve one canned HTTP response and hand back the raw request text.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        let content_type = if body.starts_with('{') || body.starts_with('[') {
            "application/json"
        } else {
            "text/plain"
        };
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write");
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.expect("read");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn api_for(base_url: &str) -> HttpRoomApi {
    let config = ClientConfig::new(base_url).expect("config");
    HttpRoomApi::new(&config).expect("client")
}

#[test]
fn bad_request_class_covers_400_and_409() {
    let rejected = ApiError::Status { status: 400, body: "Room not found!!".into() };
    let conflict = ApiError::Status { status: 409, body: String::new() };
    let server = ApiError::Status { status: 500, body: "boom".into() };
    assert!(rejected.is_bad_request());
    assert!(conflict.is_bad_request());
    assert!(!server.is_bad_request());
    assert!(!ApiError::InvalidUrl("x".into()).is_bad_request());
}

#[test]
fn server_message_ignores_blank_bodies() {
    let rejected = ApiError::Status { status: 400, body: " Room not found!! \n".into() };
    assert_eq!(rejected.server_message(), Some("Room not found!!"));
    let blank = ApiError::Status { status: 400, body: "  ".into() };
    assert_eq!(blank.server_message(), None);
}

#[test]
fn rooms_url_percent_encodes_room_ids() {
    let api = api_for("http://localhost:8080");
    let url = api.rooms_url(&["a b/c", "messages"]).expect("url");
    assert_eq!(url.as_str(), "http://localhost:8080/api/v1/rooms/a%20b%2Fc/messages");
    assert_eq!(api.rooms_url(&[]).expect("url").as_str(), "http://localhost:8080/api/v1/rooms");
}

#[tokio::test]
async fn join_room_parses_confirmed_room() {
    let (base, server) = serve_once("200 OK", r#"{"id":"1","roomId":"abc123","messages":[]}"#).await;
    let room = api_for(&base).join_room("abc123").await.expect("join");
    assert_eq!(room.room_id, "abc123");

    let request = server.await.expect("server task");
    assert!(request.starts_with("GET /api/v1/rooms/abc123 HTTP/1.1"), "{request}");
}

#[tokio::test]
async fn join_room_unknown_room_keeps_server_message() {
    let (base, _server) = serve_once("400 Bad Request", "Room not found!!").await;
    let err = api_for(&base).join_room("nope").await.expect_err("should fail");
    assert!(err.is_bad_request());
    assert_eq!(err.server_message(), Some("Room not found!!"));
}

#[tokio::test]
async fn create_room_posts_plain_text_room_id() {
    let (base, server) = serve_once("201 Created", r#"{"roomId":"abc123"}"#).await;
    let room = api_for(&base).create_room("abc123").await.expect("create");
    assert_eq!(room.room_id, "abc123");

    let request = server.await.expect("server task");
    assert!(request.starts_with("POST /api/v1/rooms HTTP/1.1"), "{request}");
    assert!(request.to_ascii_lowercase().contains("content-type: text/plain"));
    assert!(request.ends_with("\r\n\r\nabc123"), "{request}");
}

#[tokio::test]
async fn create_room_conflict_is_bad_request() {
    let (base, _server) = serve_once("400 Bad Request", "Room already exists!").await;
    let err = api_for(&base).create_room("abc123").await.expect_err("should fail");
    assert!(matches!(err, ApiError::Status { status: 400, .. }));
    assert!(err.is_bad_request());
}

#[tokio::test]
async fn fetch_history_requests_first_page_in_order() {
    let (base, server) = serve_once(
        "200 OK",
        r#"[{"sender":"alice","content":"one","timeStamp":"2024-01-01T00:00:00"},{"sender":"bob","content":"two","timeStamp":"2024-01-01T00:00:05"}]"#,
    )
    .await;
    let history = api_for(&base).fetch_history("abc123").await.expect("history");
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two"]);

    let request = server.await.expect("server task");
    assert!(
        request.starts_with("GET /api/v1/rooms/abc123/messages?size=50&page=0 HTTP/1.1"),
        "{request}"
    );
}

#[tokio::test]
async fn fetch_history_server_error_is_not_bad_request() {
    let (base, _server) = serve_once("500 Internal Server Error", "boom").await;
    let err = api_for(&base).fetch_history("abc123").await.expect_err("should fail");
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert!(!err.is_bad_request());
}
