//! # Frame Codec
//!
//! Length-prefixed framing for the stream transport.
//!
//! The decoder's `BytesMut` is the receive accumulator: `FramedRead` appends
//! every raw read to it and calls [`PacketCodec::decode`] until no complete
//! frame is left, so frames split across reads are reassembled and several
//! frames delivered by one read are all extracted. Whatever is not consumed
//! stays in the buffer for the next read.
//!
//! A non-positive length header cannot be resynchronised from, so the whole
//! accumulator is discarded and parsing restarts with the next read.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::config::MAX_FRAME_SIZE;
use crate::core::packet::{Packet, HEADER_SIZE};
use crate::error::{ProtocolError, Result};
use crate::utils::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct PacketCodec {
    max_frame_size: usize,
    metrics: Option<Arc<Metrics>>,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl PacketCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            metrics: None,
        }
    }

    /// Count malformed and decoded frames into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if declared <= 0 {
            warn!(
                declared,
                discarded = src.len(),
                "Malformed frame length, discarding receive buffer"
            );
            if let Some(metrics) = &self.metrics {
                metrics.malformed_frame();
            }
            src.clear();
            return Ok(None);
        }

        let frame_len = declared as usize;
        if frame_len > self.max_frame_size {
            return Err(ProtocolError::OversizedFrame(frame_len));
        }

        if src.len() - HEADER_SIZE < frame_len {
            // Keep the partial frame and make room for the rest of it.
            src.reserve(HEADER_SIZE + frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let frame = src.split_to(frame_len).freeze();
        if let Some(metrics) = &self.metrics {
            metrics.frame_received(frame_len as u64);
        }
        Ok(Some(Packet::from(frame)))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<()> {
        let len = packet.len();
        if len > self.max_frame_size {
            return Err(ProtocolError::OversizedFrame(len));
        }

        dst.reserve(HEADER_SIZE + len);
        dst.put_i32_le(len as i32);
        dst.extend_from_slice(packet.as_bytes());
        Ok(())
    }
}
