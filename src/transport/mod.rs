//! # Transport Layer
//!
//! The two connections a client keeps to its server.
//!
//! - [`stream`]: reliable, ordered TCP connection carrying length-prefixed frames
//! - [`datagram`]: unreliable UDP socket, one frame per datagram
//!
//! Both run their receive loops as tasks on the I/O runtime. Neither ever calls
//! a packet handler directly: complete frames go through an [`InboundRoute`],
//! which wraps them in a pending action on the dispatch queue, and receive
//! failures are posted as control events for the connection controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::core::packet::Packet;
use crate::error::ProtocolError;
use crate::protocol::{DispatchQueue, EventSender, PacketRegistry};
use crate::utils::metrics::Metrics;

pub mod datagram;
pub mod stream;

pub use datagram::DatagramTransport;
pub use stream::{ConnectPoll, StreamState, StreamTransport};

/// Where a transport sends what it receives during one session.
#[derive(Clone)]
pub struct InboundRoute {
    queue: DispatchQueue,
    registry: Arc<PacketRegistry>,
    events: EventSender,
    metrics: Arc<Metrics>,
    live_epoch: Arc<AtomicU64>,
}

impl InboundRoute {
    /// `live_epoch` is the controller's current session; frames drained after
    /// it moves past `events.epoch()` are dropped unhandled.
    pub fn new(
        queue: DispatchQueue,
        registry: Arc<PacketRegistry>,
        events: EventSender,
        metrics: Arc<Metrics>,
        live_epoch: Arc<AtomicU64>,
    ) -> Self {
        Self {
            queue,
            registry,
            events,
            metrics,
            live_epoch,
        }
    }

    /// Queue `frame` for dispatch on the consumer thread.
    pub fn deliver(&self, frame: Packet) {
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let live_epoch = Arc::clone(&self.live_epoch);
        let epoch = self.events.epoch();

        self.queue.enqueue(move || {
            if live_epoch.load(Ordering::Acquire) != epoch {
                debug!(epoch, "Dropping packet from a closed session");
                return;
            }
            match registry.dispatch_frame(frame) {
                Ok(id) => trace!(packet_id = id, "Packet handled"),
                Err(ProtocolError::UnknownPacket(id)) => {
                    metrics.unknown_packet();
                    warn!(packet_id = id, "Unhandled packet type");
                }
                Err(e) => warn!(error = %e, "Packet handler failed"),
            }
        });
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
