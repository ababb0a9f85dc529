//! SockJS session framing over its WebSocket transport.
//!
//! The broker's `/chat` endpoint speaks SockJS. On the WebSocket transport
//! the server opens with `o`, beats with `h`, delivers payloads as
//! `a["...", ...]` and closes with `c[code,"reason"]`. Client payloads go
//! out as a JSON array of strings. The `/info` probe tells the client
//! whether the WebSocket transport is allowed at all.

use rand::Rng;
use serde::Deserialize;

/// Characters sockjs clients draw session ids from.
const SESSION_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz012345";
const SESSION_ID_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SockJsError {
    #[error("empty SockJS frame")]
    Empty,
    #[error("unknown SockJS frame type: {0}")]
    UnknownType(char),
    #[error("malformed SockJS payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

/// Body of `GET {endpoint}/info`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub websocket: bool,
    #[serde(default)]
    pub cookie_needed: bool,
    #[serde(default)]
    pub origins: Vec<String>,
    /// Signed: Spring fills it from `Random.nextInt()`.
    #[serde(default)]
    pub entropy: i64,
}

/// Parse one WebSocket text message from a SockJS server.
///
/// # Errors
///
/// Returns [`SockJsError`] for empty input, unknown frame letters, or a
/// payload that is not the JSON shape the frame type requires.
pub fn parse_frame(raw: &str) -> Result<SockJsFrame, SockJsError> {
    let mut chars = raw.chars();
    let kind = chars.next().ok_or(SockJsError::Empty)?;
    let rest = chars.as_str();
    match kind {
        'o' => Ok(SockJsFrame::Open),
        'h' => Ok(SockJsFrame::Heartbeat),
        'a' => Ok(SockJsFrame::Messages(serde_json::from_str(rest)?)),
        'm' => Ok(SockJsFrame::Messages(vec![serde_json::from_str(rest)?])),
        'c' => {
            let (code, reason): (u16, String) = serde_json::from_str(rest)?;
            Ok(SockJsFrame::Close { code, reason })
        }
        other => Err(SockJsError::UnknownType(other)),
    }
}

/// Wrap client payloads for the SockJS WebSocket transport.
#[must_use]
pub fn encode_messages(messages: &[&str]) -> String {
    serde_json::to_string(messages).unwrap_or_default()
}

/// Random `/{server}/{session}/websocket` suffix for the endpoint URL.
pub fn session_path<R: Rng + ?Sized>(rng: &mut R) -> String {
    let server: u16 = rng.random_range(0..1000);
    let session: String = (0..SESSION_ID_LEN)
        .map(|_| char::from(SESSION_ALPHABET[rng.random_range(0..SESSION_ALPHABET.len())]))
        .collect();
    format!("/{server:03}/{session}/websocket")
}

#[must_use]
pub fn info_url(endpoint_url: &str) -> String {
    format!("{endpoint_url}/info")
}

#[cfg(test)]
#[path = "sockjs_test.rs"]
mod tests;
