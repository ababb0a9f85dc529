//! Realtime transport to the chat broker.
//!
//! DESIGN
//! ======
//! `sockjs` handles the SockJS session framing, `connection` runs the STOMP
//! session on top of either framing. STOMP frame encoding itself lives in
//! the `stomp` workspace crate.

pub mod connection;
pub mod sockjs;

pub use connection::{Connection, ConnectionError, Connector, StompConnector};
