//! # hush
//!
//! Terminal client for a room-based realtime chat service.
//!
//! A user joins or creates a room over the REST room service
//! ([`room_entry`]), then the [`chat_session`] loads the room's history,
//! subscribes to its live topic over STOMP ([`net`]), and publishes typed
//! messages. Both steps share one [`session::SessionStore`].

pub mod api;
pub mod app;
pub mod chat_session;
pub mod config;
pub mod model;
pub mod net;
pub mod room_entry;
pub mod session;
pub mod util;
pub mod view;
