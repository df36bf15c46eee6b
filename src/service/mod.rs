//! # Service Layer
//!
//! The connection controller that game and UI code talk to.
//!
//! - [`client`]: the [`Client`] handle, connection state and session lifecycle
//! - [`retry`]: the bounded connect sequence `Client::tick` advances

pub mod client;
pub mod retry;

pub use client::{Client, ConnectionState, ConnectionStatus, SessionResetHook};
pub use retry::ConnectSequence;
