//! # Packet Buffer
//!
//! A growable byte buffer with independent read and write cursors.
//!
//! Every protocol message is built into (or parsed out of) a [`Packet`]. Writes
//! append at the write cursor, which is always the end of the buffer; reads
//! consume from the read cursor and can never pass the write cursor.
//!
//! ## Encoding
//! - Integers and floats: fixed width, little-endian
//! - Booleans: one byte, `0` or `1`
//! - Strings: `i32` byte length followed by UTF-8 bytes
//!
//! ```text
//! [len: i32][id: i32][field...]
//!  ^ insert_length_prefix()
//! ```

use bytes::Bytes;

use crate::error::{ProtocolError, Result};

/// Size of every length header and packet id on the wire.
pub const HEADER_SIZE: usize = 4;

/// One protocol message: a byte buffer plus a read cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    buffer: Vec<u8>,
    read_pos: usize,
}

impl Packet {
    /// Create an empty packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an outbound packet that starts with the given packet id.
    pub fn with_id(id: i32) -> Self {
        let mut packet = Self::new();
        packet.write_i32(id);
        packet
    }

    /// Total number of written bytes (the write cursor).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current read cursor.
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Bytes written but not yet read.
    pub fn unread_len(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// The whole buffer, including bytes already read.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// The unread part of the buffer.
    pub fn unread(&self) -> &[u8] {
        &self.buffer[self.read_pos..]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Clear both cursors, optionally re-seeding the buffer with leftover bytes.
    pub fn reset(&mut self, seed: Option<&[u8]>) {
        self.buffer.clear();
        self.read_pos = 0;
        if let Some(seed) = seed {
            self.buffer.extend_from_slice(seed);
        }
    }

    // ----------------------------------------------------------------------
    // Writes
    // ----------------------------------------------------------------------

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append raw bytes with no length information.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_length(value.len());
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Insert an `i32` at the head of the buffer.
    ///
    /// Used to prepend the session id to datagrams without rebuilding the packet.
    pub fn insert_i32(&mut self, value: i32) {
        self.buffer.splice(0..0, value.to_le_bytes());
    }

    /// Insert a 4-byte header at offset 0 holding the number of bytes after it.
    pub fn insert_length_prefix(&mut self) {
        let len = self.buffer.len();
        self.insert_i32(len_to_i32(len));
    }

    fn write_length(&mut self, len: usize) {
        self.write_i32(len_to_i32(len));
    }

    // ----------------------------------------------------------------------
    // Reads
    // ----------------------------------------------------------------------

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.take().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.take().map(i64::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.take().map(f32::from_le_bytes)
    }

    /// Read an `i32` without moving the read cursor.
    pub fn peek_i32(&self) -> Result<i32> {
        let bytes = self.slice(HEADER_SIZE)?;
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(raw))
    }

    /// Consume exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let bytes = self.slice(len)?.to_vec();
        self.read_pos += len;
        Ok(bytes)
    }

    /// Consume a length-prefixed UTF-8 string.
    ///
    /// The cursor is left untouched when the string is truncated or invalid.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.read_pos;
        let result = self.read_string_inner();
        if result.is_err() {
            self.read_pos = start;
        }
        result
    }

    fn read_string_inner(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::InvalidString(format!("negative length {len}")))?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidString(e.to_string()))
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut raw = [0u8; N];
        raw.copy_from_slice(self.slice(N)?);
        self.read_pos += N;
        Ok(raw)
    }

    fn slice(&self, len: usize) -> Result<&[u8]> {
        let available = self.unread_len();
        if len > available {
            return Err(ProtocolError::Underflow {
                requested: len,
                available,
            });
        }
        Ok(&self.buffer[self.read_pos..self.read_pos + len])
    }
}

impl From<Vec<u8>> for Packet {
    fn from(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            read_pos: 0,
        }
    }
}

impl From<&[u8]> for Packet {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl From<Bytes> for Packet {
    fn from(bytes: Bytes) -> Self {
        Self::from(Vec::from(bytes))
    }
}

// Lengths past i32::MAX cannot be represented on the wire; the codec rejects
// frames that large long before this saturates.
fn len_to_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}
