//! # Core Protocol Components
//!
//! Packet buffers and stream framing.
//!
//! ## Components
//! - **Packet**: cursor-based byte buffer used for every message
//! - **Codec**: Tokio codec that turns a byte stream into frames
//!
//! ## Wire Format
//! ```text
//! [Length(4, LE i32)] [PacketId(4, LE i32)] [Fields(N)]
//! ```
//!
//! The length counts every byte after the header, packet id included.
//! Non-positive lengths are malformed; lengths above the configured maximum
//! (16 MiB by default) close the connection.

pub mod codec;
pub mod packet;
