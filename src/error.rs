//! # Error Types
//!
//! Error handling for the client transport core.
//!
//! This module defines every error variant that can surface from packet
//! parsing, framing, transports and the connection controller.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and file system failures
//! - **Packet Errors**: reads past the written data, malformed strings
//! - **Framing Errors**: non-positive or oversized length headers, short datagrams
//! - **Protocol Errors**: unknown or reserved packet ids
//! - **Connection Errors**: connect timeouts, unresolvable hosts
//!
//! Most of these never reach the caller: transports log and swallow send
//! failures, and receive failures are turned into a disconnect. They are
//! returned from the synchronous parts of the API (packet reads, handler
//! registration, configuration).
//!
//! ## Example Usage
//! ```rust
//! use multiplayer_transport::core::packet::Packet;
//! use multiplayer_transport::error::{ProtocolError, Result};
//!
//! fn read_health(packet: &mut Packet) -> Result<(i32, i32)> {
//!     let health = packet.read_i32()?;
//!     let max_health = packet.read_i32()?;
//!     Ok((health, max_health))
//! }
//!
//! let mut packet = Packet::new();
//! packet.write_i32(5);
//! assert!(matches!(read_health(&mut packet), Err(ProtocolError::Underflow { .. })));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Framing errors
    pub const ERR_SHORT_DATAGRAM: &str = "Datagram shorter than the minimum header";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed by peer";
    pub const ERR_NO_ADDRESS: &str = "Host did not resolve to any address";
}

/// ProtocolError is the error type for all transport core operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Packet underflow: requested {requested} bytes, {available} unread")]
    Underflow { requested: usize, available: usize },

    #[error("Invalid string field: {0}")]
    InvalidString(String),

    #[error("Invalid field value: {0}")]
    InvalidField(String),

    #[error("Malformed frame length: {0}")]
    MalformedFrame(i32),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Malformed datagram: {0}")]
    MalformedDatagram(String),

    #[error("Unhandled packet type {0}")]
    UnknownPacket(i32),

    #[error("Packet id {0} is reserved for session handling")]
    ReservedPacketId(i32),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
