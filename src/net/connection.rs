//! Realtime connection: one STOMP session subscribed to one room.
//!
//! DESIGN
//! ======
//! `StompConnector::open` performs the whole handshake inline (transport
//! negotiation, WebSocket upgrade, CONNECT/CONNECTED, SUBSCRIBE) and only
//! then hands back a `Connection`. From that point a spawned driver task
//! owns the socket and runs a `select!` loop:
//! - commands from the handle (publish / close) → STOMP frames out
//! - MESSAGE frames in → parsed `ChatMessage`s on one ordered channel
//! - negotiated heart-beats out on an interval
//! - a broker silent for two incoming heart-beat periods ends the session
//!
//! LIFECYCLE
//! =========
//! 1. open → live
//! 2. publish* / next_message*
//! 3. close → DISCONNECT, bounded wait for RECEIPT, socket closed
//!
//! `close` on an already closed connection is a no-op. Dropping a
//! `Connection` aborts its driver, so nothing is delivered after the owner
//! is gone.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use stomp::HeartBeat;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::sockjs::{self, ServerInfo, SockJsError, SockJsFrame};
use crate::config::{ClientConfig, TransportMode};
use crate::model::{ChatMessage, send_destination, topic_destination};

/// Subscription id used for the single room subscription.
pub const SUBSCRIPTION_ID: &str = "sub-0";

/// Upper bound on waiting for the DISCONNECT receipt.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on waiting for the driver to acknowledge a close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Missed incoming heart-beat periods tolerated before the broker is
/// considered gone.
const STALL_FACTOR: u32 = 2;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport probe failed: {0}")]
    Probe(#[from] reqwest::Error),
    #[error("server does not allow the websocket transport")]
    NoTransport,
    #[error("websocket failed: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connection closed")]
    Closed,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("broker rejected connection: {0}")]
    Rejected(String),
    #[error("frame decode failed: {0}")]
    Codec(#[from] stomp::CodecError),
    #[error("sockjs framing failed: {0}")]
    SockJs(#[from] SockJsError),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection is not live")]
    NotLive,
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectionError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

/// Opens room connections. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Connect, complete the STOMP handshake, and subscribe to the room topic.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if negotiation, the upgrade, or the
    /// handshake fails or times out.
    async fn open(&self, room_id: &str) -> Result<Connection, ConnectionError>;
}

/// Instruction from a `Connection` handle to its driver.
#[derive(Debug)]
pub(crate) enum DriverCommand {
    Publish(ChatMessage),
    Close(oneshot::Sender<()>),
}

// =============================================================================
// CONNECTION HANDLE
// =============================================================================

/// Owned handle to one live room subscription.
pub struct Connection {
    room_id: String,
    commands: mpsc::UnboundedSender<DriverCommand>,
    inbound: mpsc::UnboundedReceiver<ChatMessage>,
    driver: Option<JoinHandle<()>>,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(
        room_id: &str,
        commands: mpsc::UnboundedSender<DriverCommand>,
        inbound: mpsc::UnboundedReceiver<ChatMessage>,
        driver: Option<JoinHandle<()>>,
    ) -> Self {
        Self { room_id: room_id.to_owned(), commands, inbound, driver, closed: false }
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Not closed by the owner and the driver is still running.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.closed && !self.commands.is_closed()
    }

    /// Queue a message for the room's send destination. Fire and forget.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotLive`] after close or once the driver
    /// has stopped.
    pub fn publish(&self, message: ChatMessage) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::NotLive);
        }
        self.commands
            .send(DriverCommand::Publish(message))
            .map_err(|_| ConnectionError::NotLive)
    }

    /// Next inbound message in delivery order; `None` once the driver stopped
    /// and everything it delivered has been read.
    pub async fn next_message(&mut self) -> Option<ChatMessage> {
        self.inbound.recv().await
    }

    /// Next already-delivered message without waiting.
    pub fn try_next_message(&mut self) -> Option<ChatMessage> {
        self.inbound.try_recv().ok()
    }

    /// Disconnect from the broker. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(DriverCommand::Close(ack_tx)).is_ok()
            && timeout(CLOSE_TIMEOUT, ack_rx).await.is_err()
        {
            warn!(room_id = %self.room_id, "stomp: driver did not acknowledge close");
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
            let _ = driver.await;
        }
        info!(room_id = %self.room_id, "stomp: connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

// =============================================================================
// STOMP CONNECTOR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// STOMP frames directly in WebSocket text messages.
    Raw,
    /// STOMP frames wrapped in SockJS `a[...]` arrays.
    SockJs,
}

/// Connector for a STOMP broker behind the configured `/chat` endpoint.
pub struct StompConnector {
    config: ClientConfig,
    http: reqwest::Client,
}

impl StompConnector {
    /// # Errors
    ///
    /// Returns [`ConnectionError::Probe`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ConnectionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    async fn resolve_transport(&self) -> Result<(String, Framing), ConnectionError> {
        match self.config.transport {
            TransportMode::WebSocket => Ok((self.config.ws_endpoint_url(), Framing::Raw)),
            TransportMode::SockJs => Ok((self.sockjs_url(), Framing::SockJs)),
            TransportMode::Auto => match self.probe_info().await {
                Ok(Some(info)) if info.websocket => Ok((self.sockjs_url(), Framing::SockJs)),
                Ok(Some(_)) => Err(ConnectionError::NoTransport),
                Ok(None) => Ok((self.config.ws_endpoint_url(), Framing::Raw)),
                Err(e) => {
                    debug!(error = %e, "stomp: sockjs probe failed; trying raw websocket");
                    Ok((self.config.ws_endpoint_url(), Framing::Raw))
                }
            },
        }
    }

    /// `Ok(None)` when the endpoint has no SockJS info resource.
    async fn probe_info(&self) -> Result<Option<ServerInfo>, ConnectionError> {
        let url = sockjs::info_url(&self.config.endpoint_url());
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            debug!(%url, status = response.status().as_u16(), "stomp: no sockjs info");
            return Ok(None);
        }
        Ok(Some(response.json::<ServerInfo>().await?))
    }

    fn sockjs_url(&self) -> String {
        let path = sockjs::session_path(&mut rand::rng());
        format!("{}{path}", self.config.ws_endpoint_url())
    }
}

#[async_trait::async_trait]
impl Connector for StompConnector {
    async fn open(&self, room_id: &str) -> Result<Connection, ConnectionError> {
        let (url, framing) = self.resolve_transport().await?;
        info!(%room_id, %url, ?framing, "stomp: connecting");

        let connect_timeout = self.config.connect_timeout;
        let (stream, _) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ConnectionError::Timeout("websocket upgrade"))??;
        let (sink, source) = stream.split();
        let mut outbound = Outbound { sink, framing };
        let mut inbound = Inbound { source, framing };

        let requested = HeartBeat::new(self.config.heartbeat_ms, self.config.heartbeat_ms);
        let handshake = async {
            if framing == Framing::SockJs {
                inbound.await_open().await?;
            }
            outbound
                .send_frame(&stomp::Frame::connect(self.config.broker_host(), requested))
                .await?;
            let connected = inbound.await_connected().await?;
            let granted = connected
                .header(stomp::HEART_BEAT)
                .map(HeartBeat::parse)
                .transpose()?
                .unwrap_or(HeartBeat::NONE);
            outbound
                .send_frame(&stomp::Frame::subscribe(SUBSCRIPTION_ID, &topic_destination(room_id)))
                .await?;
            Ok::<_, ConnectionError>((
                requested.send_interval_ms(granted),
                requested.receive_interval_ms(granted),
            ))
        };
        let (send_interval_ms, receive_interval_ms) = timeout(connect_timeout, handshake)
            .await
            .map_err(|_| ConnectionError::Timeout("STOMP CONNECTED"))??;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();
        let heartbeats = Heartbeats {
            send: (send_interval_ms > 0).then(|| Duration::from_millis(u64::from(send_interval_ms))),
            stall: (receive_interval_ms > 0)
                .then(|| Duration::from_millis(u64::from(receive_interval_ms)) * STALL_FACTOR),
        };
        let driver = tokio::spawn(drive(
            room_id.to_owned(),
            outbound,
            inbound,
            commands_rx,
            deliver_tx,
            heartbeats,
        ));

        info!(
            %room_id,
            send_heartbeat_ms = send_interval_ms,
            receive_heartbeat_ms = receive_interval_ms,
            "stomp: subscribed"
        );
        Ok(Connection::new(room_id, commands_tx, deliver_rx, Some(driver)))
    }
}

// =============================================================================
// SOCKET HALVES
// =============================================================================

struct Outbound {
    sink: SplitSink<WsStream, Message>,
    framing: Framing,
}

impl Outbound {
    async fn send_frame(&mut self, frame: &stomp::Frame) -> Result<(), ConnectionError> {
        self.send_text(&stomp::encode_frame(frame)).await
    }

    async fn send_heartbeat(&mut self) -> Result<(), ConnectionError> {
        self.send_text(stomp::HEARTBEAT_EOL).await
    }

    async fn send_text(&mut self, payload: &str) -> Result<(), ConnectionError> {
        let text = match self.framing {
            Framing::Raw => payload.to_owned(),
            Framing::SockJs => sockjs::encode_messages(&[payload]),
        };
        self.sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

struct Inbound {
    source: SplitStream<WsStream>,
    framing: Framing,
}

impl Inbound {
    /// Next batch of STOMP frames. Heart-beats and SockJS control frames
    /// yield an empty batch.
    async fn recv(&mut self) -> Result<Vec<stomp::Frame>, ConnectionError> {
        loop {
            let Some(message) = self.source.next().await else {
                return Err(ConnectionError::Closed);
            };
            match message? {
                Message::Text(text) => return self.decode(text.as_str()),
                Message::Binary(bytes) => return self.decode(&String::from_utf8_lossy(&bytes)),
                Message::Close(_) => return Err(ConnectionError::Closed),
                _ => {}
            }
        }
    }

    fn decode(&self, text: &str) -> Result<Vec<stomp::Frame>, ConnectionError> {
        match self.framing {
            Framing::Raw => Ok(stomp::decode_frames(text)?),
            Framing::SockJs => match sockjs::parse_frame(text)? {
                SockJsFrame::Open | SockJsFrame::Heartbeat => Ok(Vec::new()),
                SockJsFrame::Messages(payloads) => {
                    let mut frames = Vec::new();
                    for payload in &payloads {
                        frames.extend(stomp::decode_frames(payload)?);
                    }
                    Ok(frames)
                }
                SockJsFrame::Close { code, reason } => {
                    debug!(code, %reason, "sockjs: session closed by server");
                    Err(ConnectionError::Closed)
                }
            },
        }
    }

    /// Wait for the SockJS `o` frame that precedes any payload.
    async fn await_open(&mut self) -> Result<(), ConnectionError> {
        loop {
            let Some(message) = self.source.next().await else {
                return Err(ConnectionError::Closed);
            };
            let Message::Text(text) = message? else {
                continue;
            };
            match sockjs::parse_frame(text.as_str())? {
                SockJsFrame::Open => return Ok(()),
                SockJsFrame::Close { .. } => return Err(ConnectionError::Closed),
                SockJsFrame::Heartbeat | SockJsFrame::Messages(_) => {}
            }
        }
    }

    async fn await_connected(&mut self) -> Result<stomp::Frame, ConnectionError> {
        loop {
            for frame in self.recv().await? {
                match frame.command {
                    stomp::Command::Connected => return Ok(frame),
                    stomp::Command::Error => {
                        let reason = frame
                            .header(stomp::MESSAGE)
                            .map_or_else(|| frame.body.clone(), ToOwned::to_owned);
                        return Err(ConnectionError::Rejected(reason));
                    }
                    _ => {}
                }
            }
        }
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Negotiated heart-beat timing for one connection.
#[derive(Debug, Clone, Copy)]
struct Heartbeats {
    /// Period of outgoing beats.
    send: Option<Duration>,
    /// Silence from the broker after which the connection is dropped.
    stall: Option<Duration>,
}

async fn drive(
    room_id: String,
    mut outbound: Outbound,
    mut inbound: Inbound,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
    deliver: mpsc::UnboundedSender<ChatMessage>,
    heartbeats: Heartbeats,
) {
    let mut last_inbound = Instant::now();
    let mut heartbeat = heartbeats.send.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(DriverCommand::Publish(message)) => {
                    if let Err(e) = publish(&mut outbound, &room_id, &message).await {
                        warn!(%room_id, error = %e, "stomp: publish failed");
                        break;
                    }
                }
                Some(DriverCommand::Close(ack)) => {
                    disconnect(&mut outbound, &mut inbound, &room_id).await;
                    let _ = ack.send(());
                    return;
                }
                None => break,
            },
            frames = inbound.recv() => match frames {
                Ok(frames) => {
                    last_inbound = Instant::now();
                    if !dispatch_frames(&room_id, frames, &deliver) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%room_id, error = %e, "stomp: connection lost");
                    break;
                }
            },
            () = tick(heartbeat.as_mut()) => {
                if let Err(e) = outbound.send_heartbeat().await {
                    warn!(%room_id, error = %e, "stomp: heart-beat failed");
                    break;
                }
            }
            () = stalled(heartbeats.stall.map(|limit| last_inbound + limit)) => {
                warn!(%room_id, "stomp: no heart-beat from broker; dropping connection");
                break;
            }
        }
    }

    outbound.close().await;
    debug!(%room_id, "stomp: driver stopped");
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn stalled(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn publish(
    outbound: &mut Outbound,
    room_id: &str,
    message: &ChatMessage,
) -> Result<(), ConnectionError> {
    let body = serde_json::to_string(message)?;
    outbound
        .send_frame(&stomp::Frame::send_json(&send_destination(room_id), body))
        .await
}

/// Forward MESSAGE bodies to the owner. Returns `false` when the driver
/// should stop (broker ERROR or the owner is gone).
fn dispatch_frames(
    room_id: &str,
    frames: Vec<stomp::Frame>,
    deliver: &mpsc::UnboundedSender<ChatMessage>,
) -> bool {
    for frame in frames {
        match frame.command {
            stomp::Command::Message => match serde_json::from_str::<ChatMessage>(&frame.body) {
                Ok(message) => {
                    if deliver.send(message).is_err() {
                        return false;
                    }
                }
                Err(e) => {
                    warn!(%room_id, error = %e, "stomp: skipping unparseable message body");
                }
            },
            stomp::Command::Error => {
                warn!(
                    %room_id,
                    message = frame.header(stomp::MESSAGE).unwrap_or_default(),
                    body = %frame.body,
                    "stomp: broker error"
                );
                return false;
            }
            other => debug!(%room_id, command = %other, "stomp: ignoring frame"),
        }
    }
    true
}

async fn disconnect(outbound: &mut Outbound, inbound: &mut Inbound, room_id: &str) {
    let receipt = format!("close-{}", uuid::Uuid::new_v4());
    if outbound.send_frame(&stomp::Frame::disconnect(&receipt)).await.is_ok() {
        let wait_receipt = async {
            loop {
                let Ok(frames) = inbound.recv().await else {
                    return;
                };
                if frames.iter().any(|f| {
                    f.command == stomp::Command::Receipt
                        && f.header(stomp::RECEIPT_ID) == Some(receipt.as_str())
                }) {
                    return;
                }
            }
        };
        if timeout(RECEIPT_TIMEOUT, wait_receipt).await.is_err() {
            debug!(%room_id, "stomp: no DISCONNECT receipt; closing anyway");
        }
    }
    outbound.close().await;
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
