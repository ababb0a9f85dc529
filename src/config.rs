//! Client configuration parsed from command-line flags and environment.
//!
//! The only required value is the server base URL. Every realtime and REST
//! endpoint is derived from it, so a bad URL is rejected once here instead
//! of at each call site.

use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HEARTBEAT_MS: u32 = 10_000;
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// Path of the realtime endpoint relative to the base URL.
pub const CHAT_ENDPOINT: &str = "/chat";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("unknown transport '{0}' (expected 'auto', 'sockjs' or 'websocket')")]
    UnknownTransport(String),
}

/// How the realtime connection reaches the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Probe the SockJS info endpoint and fall back to a raw WebSocket.
    #[default]
    Auto,
    /// SockJS session over its WebSocket transport.
    SockJs,
    /// Plain WebSocket carrying STOMP frames directly.
    WebSocket,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sockjs" => Ok(Self::SockJs),
            "websocket" | "ws" => Ok(Self::WebSocket),
            _ => Err(ConfigError::UnknownTransport(raw.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `http(s)://host[:port]` with no trailing slash.
    pub base_url: String,
    pub transport: TransportMode,
    pub connect_timeout: Duration,
    /// Requested STOMP heart-beat in both directions; 0 disables.
    pub heartbeat_ms: u32,
    pub history_page_size: u32,
}

impl ClientConfig {
    /// Build a config with defaults for everything but the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] unless the URL is `http://` or
    /// `https://` with a non-empty host.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            transport: TransportMode::Auto,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        })
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `HUSH_BASE_URL`: default `http://localhost:8080`
    /// - `HUSH_TRANSPORT`: `auto` (default), `sockjs` or `websocket`
    /// - `HUSH_CONNECT_TIMEOUT_SECS`: default 10
    /// - `HUSH_HEARTBEAT_MS`: default 10000, 0 disables
    /// - `HUSH_HISTORY_SIZE`: default 50
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a bad base URL or unknown transport.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("HUSH_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let transport = parse_transport(std::env::var("HUSH_TRANSPORT").ok().as_deref())?;
        let connect_secs = env_parse("HUSH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS);
        let heartbeat_ms = env_parse("HUSH_HEARTBEAT_MS", DEFAULT_HEARTBEAT_MS);
        let history_size = env_parse("HUSH_HISTORY_SIZE", DEFAULT_HISTORY_PAGE_SIZE);

        Ok(Self::new(&base_url)?
            .with_transport(transport)
            .with_connect_timeout(Duration::from_secs(connect_secs))
            .with_heartbeat_ms(heartbeat_ms)
            .with_history_page_size(history_size))
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_heartbeat_ms(mut self, heartbeat_ms: u32) -> Self {
        self.heartbeat_ms = heartbeat_ms;
        self
    }

    #[must_use]
    pub fn with_history_page_size(mut self, size: u32) -> Self {
        self.history_page_size = size.max(1);
        self
    }

    /// HTTP URL of the realtime endpoint (used for the SockJS info probe).
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("{}{CHAT_ENDPOINT}", self.base_url)
    }

    /// `ws://` / `wss://` URL of the realtime endpoint.
    #[must_use]
    pub fn ws_endpoint_url(&self) -> String {
        format!("{}{CHAT_ENDPOINT}", ws_base_url(&self.base_url))
    }

    /// Host name sent in the STOMP CONNECT `host` header.
    #[must_use]
    pub fn broker_host(&self) -> &str {
        let authority = self
            .base_url
            .split_once("://")
            .map_or(self.base_url.as_str(), |(_, rest)| rest);
        let authority = authority.split('/').next().unwrap_or(authority);
        match authority.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
            _ => authority,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_transport(raw: Option<&str>) -> Result<TransportMode, ConfigError> {
    raw.map_or(Ok(TransportMode::Auto), str::parse)
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let rest = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_else(|| ConfigError::InvalidBaseUrl(raw.to_owned()))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

/// Swap the HTTP scheme of a normalized base URL for its WebSocket twin.
fn ws_base_url(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        return format!("wss://{rest}");
    }
    let rest = base_url.strip_prefix("http://").unwrap_or(base_url);
    format!("ws://{rest}")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
