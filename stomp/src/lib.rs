//! STOMP 1.2 frame model and text codec for the realtime chat transport.
//!
//! This crate owns the wire representation used by the chat client's
//! connection driver and by the fake broker in its tests. A frame is a
//! command line, `name:value` header lines, a blank line, the body, and a
//! terminating NUL octet. A lone EOL between frames is a heart-beat.

use std::fmt;
use std::str::FromStr;

/// Header carrying the subscription or send destination.
pub const DESTINATION: &str = "destination";
/// Header carrying the MIME type of the body.
pub const CONTENT_TYPE: &str = "content-type";
/// Header carrying the octet length of the body.
pub const CONTENT_LENGTH: &str = "content-length";
/// Header requesting a RECEIPT for a client frame.
pub const RECEIPT: &str = "receipt";
/// Header on a RECEIPT frame echoing the requested receipt.
pub const RECEIPT_ID: &str = "receipt-id";
/// Subscription identifier header on SUBSCRIBE / UNSUBSCRIBE.
pub const ID: &str = "id";
/// Header on MESSAGE frames naming the matching subscription.
pub const SUBSCRIPTION: &str = "subscription";
/// Short error description header on ERROR frames.
pub const MESSAGE: &str = "message";
/// Versions the client accepts, sent on CONNECT.
pub const ACCEPT_VERSION: &str = "accept-version";
/// Virtual host header sent on CONNECT.
pub const HOST: &str = "host";
/// Heart-beat negotiation header on CONNECT / CONNECTED.
pub const HEART_BEAT: &str = "heart-beat";
/// Negotiated protocol version on CONNECTED.
pub const VERSION: &str = "version";

/// Versions offered on CONNECT, matching what browser STOMP clients send.
pub const SUPPORTED_VERSIONS: &str = "1.0,1.1,1.2";

/// Heart-beat payload: a single end-of-line.
pub const HEARTBEAT_EOL: &str = "\n";

/// Error returned by [`decode_frames`] and [`HeartBeat::parse`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The command line is not a STOMP command.
    #[error("unknown STOMP command: {0}")]
    UnknownCommand(String),
    /// A header line has no `:` separator.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    /// A header contains a backslash escape STOMP 1.2 does not define.
    #[error("invalid header escape in: {0}")]
    InvalidEscape(String),
    /// The `content-length` header is not a valid octet count.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
    /// The input ended before the frame's NUL terminator.
    #[error("frame is missing its NUL terminator")]
    Unterminated,
    /// The `heart-beat` header is not two comma-separated integers.
    #[error("invalid heart-beat header: {0}")]
    InvalidHeartBeat(String),
}

// =============================================================================
// COMMAND
// =============================================================================

/// Frame command, client and server side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// Wire spelling of the command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = CodecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let command = match raw {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(CodecError::UnknownCommand(other.to_owned())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// FRAME
// =============================================================================

/// A single STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; lookups take the first.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// CONNECT frame offering every supported version.
    #[must_use]
    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .with_header(ACCEPT_VERSION, SUPPORTED_VERSIONS)
            .with_header(HOST, host)
            .with_header(HEART_BEAT, heart_beat.header_value())
    }

    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header(ID, id)
            .with_header(DESTINATION, destination)
    }

    /// SEND frame with a JSON body.
    #[must_use]
    pub fn send_json(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .with_header(DESTINATION, destination)
            .with_header(CONTENT_TYPE, "application/json")
            .with_body(body)
    }

    #[must_use]
    pub fn disconnect(receipt: &str) -> Self {
        Self::new(Command::Disconnect).with_header(RECEIPT, receipt)
    }
}

// =============================================================================
// HEART-BEAT
// =============================================================================

/// Heart-beat intervals in milliseconds as carried by the `heart-beat` header.
///
/// `outgoing_ms` is how often the sender can beat, `incoming_ms` how often it
/// wants to receive beats. Zero disables the direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing_ms: u32,
    pub incoming_ms: u32,
}

impl HeartBeat {
    pub const NONE: Self = Self { outgoing_ms: 0, incoming_ms: 0 };

    #[must_use]
    pub fn new(outgoing_ms: u32, incoming_ms: u32) -> Self {
        Self { outgoing_ms, incoming_ms }
    }

    /// Parse a `cx,cy` header value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidHeartBeat`] when the value is not two
    /// comma-separated non-negative integers.
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidHeartBeat(raw.to_owned());
        let (outgoing, incoming) = raw.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            outgoing_ms: outgoing.trim().parse().map_err(|_| invalid())?,
            incoming_ms: incoming.trim().parse().map_err(|_| invalid())?,
        })
    }

    #[must_use]
    pub fn header_value(self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Interval at which this side must send beats given the peer's header.
    #[must_use]
    pub fn send_interval_ms(self, peer: Self) -> u32 {
        if self.outgoing_ms == 0 || peer.incoming_ms == 0 {
            return 0;
        }
        self.outgoing_ms.max(peer.incoming_ms)
    }

    /// Interval at which this side can expect beats given the peer's header.
    #[must_use]
    pub fn receive_interval_ms(self, peer: Self) -> u32 {
        if self.incoming_ms == 0 || peer.outgoing_ms == 0 {
            return 0;
        }
        self.incoming_ms.max(peer.outgoing_ms)
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a frame into its text wire form, NUL terminator included.
///
/// A `content-length` header is added for non-empty bodies unless the frame
/// already carries one.
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    let mut out = String::with_capacity(frame.body.len() + 64);
    out.push_str(frame.command.as_str());
    out.push('\n');

    let escape = frame.command.escapes_headers();
    for (name, value) in &frame.headers {
        if escape {
            push_escaped(&mut out, name);
            out.push(':');
            push_escaped(&mut out, value);
        } else {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }
    if !frame.body.is_empty() && frame.header(CONTENT_LENGTH).is_none() {
        out.push_str(CONTENT_LENGTH);
        out.push(':');
        out.push_str(&frame.body.len().to_string());
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&frame.body);
    out.push('\0');
    out
}

/// Decode every frame in a chunk of transport data.
///
/// Heart-beat EOLs before, between, and after frames are skipped, so a chunk
/// holding only heart-beats decodes to an empty list.
///
/// # Errors
///
/// Returns a [`CodecError`] for unknown commands, malformed or badly escaped
/// headers, a bad `content-length`, or a frame cut off before its NUL.
pub fn decode_frames(input: &str) -> Result<Vec<Frame>, CodecError> {
    let mut frames = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, consumed) = decode_one(rest)?;
        frames.push(frame);
        rest = &rest[consumed..];
    }
}

/// Decode one frame at the start of `input`, returning it and the number of
/// bytes consumed including the NUL.
fn decode_one(input: &str) -> Result<(Frame, usize), CodecError> {
    let (command_line, mut pos) = next_line(input, 0).ok_or(CodecError::Unterminated)?;
    let command = command_line.parse::<Command>()?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, next) = next_line(input, pos).ok_or(CodecError::Unterminated)?;
        pos = next;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedHeader(line.to_owned()))?;
        if escape {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_owned(), value.to_owned()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == CONTENT_LENGTH)
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| CodecError::InvalidContentLength(value.clone()))
        })
        .transpose()?;

    let body_start = pos;
    let body_end = match content_length {
        Some(length) => {
            let end = body_start
                .checked_add(length)
                .ok_or_else(|| CodecError::InvalidContentLength(length.to_string()))?;
            if input.as_bytes().get(end) != Some(&0) {
                return Err(CodecError::Unterminated);
            }
            end
        }
        None => {
            let offset = input[body_start..]
                .find('\0')
                .ok_or(CodecError::Unterminated)?;
            body_start + offset
        }
    };

    let body = input
        .get(body_start..body_end)
        .ok_or_else(|| CodecError::InvalidContentLength((body_end - body_start).to_string()))?
        .to_owned();

    Ok((Frame { command, headers, body }, body_end + 1))
}

/// Line starting at `start`, without its `\n` / `\r\n`, plus the next offset.
fn next_line(input: &str, start: usize) -> Option<(&str, usize)> {
    let rest = input.get(start..)?;
    let end = rest.find('\n')?;
    let line = &rest[..end];
    Some((line.strip_suffix('\r').unwrap_or(line), start + end + 1))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            _ => return Err(CodecError::InvalidEscape(raw.to_owned())),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
