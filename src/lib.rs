//! # Multiplayer Transport
//!
//! Network transport core for a multiplayer game client.
//!
//! A [`Client`] keeps two connections to one server: a reliable stream
//! carrying length-prefixed frames and an unreliable datagram socket for
//! high-frequency state. Inbound packets are parsed on I/O tasks but their
//! handlers always run on the thread that calls [`Client::tick`], which also
//! drives the connect sequence and reacts to lost links.
//!
//! ## Layout
//! - [`core`]: packet buffer and frame codec
//! - [`protocol`]: handler registry, dispatch queue, control events, packet ids
//! - [`transport`]: stream and datagram transports
//! - [`service`]: the connection controller
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Wire Format
//! ```text
//! stream frame:    [length: i32 LE][packet id: i32 LE][fields]
//! datagram (out):  [session id: i32 LE][length][packet id][fields]
//! datagram (in):   [length][packet id][fields]
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::NetworkConfig;
pub use crate::core::packet::Packet;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::{ClientPacket, DispatchQueue, ServerPacket};
pub use crate::service::{Client, ConnectionState, ConnectionStatus};
