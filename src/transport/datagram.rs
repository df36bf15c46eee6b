//! # Datagram Transport
//!
//! Unreliable UDP socket for high-frequency state such as positions.
//!
//! The socket is bound on the same local port as the stream connection and
//! connected to the server, so the server can pair the two by address. Every
//! datagram carries exactly one frame:
//!
//! ```text
//! outbound: [session id: i32][length: i32][packet id: i32][fields]
//! inbound:  [length: i32][packet id: i32][fields]
//! ```
//!
//! Binding sends a bare `[session id]` datagram so the server learns the
//! client's UDP endpoint before any real traffic flows.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::packet::{Packet, HEADER_SIZE};
use crate::error::constants::ERR_SHORT_DATAGRAM;
use crate::error::{ProtocolError, Result};
use crate::protocol::events::TransportKind;
use crate::transport::InboundRoute;
use crate::utils::metrics::Metrics;

/// Strip the length header from an inbound datagram and return the frame it
/// carries (packet id first).
///
/// Datagrams shorter than a length header, or whose declared length runs past
/// the end of the datagram, are rejected. Bytes after the declared frame are
/// ignored.
pub fn unwrap_datagram(datagram: &[u8]) -> Result<Packet> {
    if datagram.len() < HEADER_SIZE {
        return Err(ProtocolError::MalformedDatagram(format!(
            "{ERR_SHORT_DATAGRAM}: {} bytes",
            datagram.len()
        )));
    }

    let mut packet = Packet::from(datagram);
    let declared = packet.read_i32()?;
    let len = usize::try_from(declared).map_err(|_| ProtocolError::MalformedFrame(declared))?;
    let frame = packet.read_bytes(len)?;
    packet.reset(Some(&frame));
    Ok(packet)
}

/// Wrap an outbound packet as `[session id][length][packet]`.
pub fn wrap_datagram(session_id: u8, mut packet: Packet) -> Vec<u8> {
    packet.insert_length_prefix();
    packet.insert_i32(i32::from(session_id));
    packet.into_bytes()
}

struct DatagramLink {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    session_id: u8,
    route: InboundRoute,
    max_datagram_size: usize,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl DatagramLink {
    /// Start the receive loop unless one is already running.
    fn arm_receive(&self, runtime: &Handle) {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if receiver.as_ref().map_or(true, |task| task.is_finished()) {
            *receiver = Some(runtime.spawn(receive_loop(
                self.socket.clone(),
                self.route.clone(),
                self.max_datagram_size,
            )));
        }
    }

    fn stop_receive(&self) {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = receiver.take() {
            task.abort();
        }
    }

    fn send_raw(self: &Arc<Self>, runtime: &Handle, bytes: Vec<u8>) {
        let link = Arc::clone(self);
        let handle = runtime.clone();
        runtime.spawn(async move {
            let metrics = link.route.metrics();
            if link.socket.peer_addr().is_err() {
                debug!(remote = %link.remote, "Datagram socket lost its peer, reconnecting");
                if let Err(e) = link.socket.connect(link.remote).await {
                    metrics.send_failure();
                    warn!(error = %e, "Error sending data to server via datagram");
                    return;
                }
                link.arm_receive(&handle);
            }

            match link.socket.send(&bytes).await {
                Ok(sent) => metrics.packet_sent(sent as u64),
                Err(e) => {
                    metrics.send_failure();
                    warn!(error = %e, "Error sending data to server via datagram");
                }
            }
        });
    }
}

pub struct DatagramTransport {
    runtime: Handle,
    max_datagram_size: usize,
    metrics: Arc<Metrics>,
    link: Option<Arc<DatagramLink>>,
}

impl DatagramTransport {
    pub fn new(runtime: Handle, max_datagram_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            runtime,
            max_datagram_size,
            metrics,
            link: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.link.is_some()
    }

    pub fn session_id(&self) -> Option<u8> {
        self.link.as_ref().map(|link| link.session_id)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.link
            .as_ref()
            .and_then(|link| link.socket.local_addr().ok())
    }

    /// Bind on `local_port`, connect to `remote`, start receiving and send the
    /// bootstrap datagram. Any previous binding is closed first.
    #[instrument(skip(self, route))]
    pub fn bind(
        &mut self,
        local_port: u16,
        remote: SocketAddr,
        session_id: u8,
        route: InboundRoute,
    ) -> Result<()> {
        self.disconnect();

        let bind_addr: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, local_port).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, local_port).into()
        };
        let std_socket = std::net::UdpSocket::bind(bind_addr)?;
        std_socket.connect(remote)?;
        std_socket.set_nonblocking(true)?;
        let socket = {
            let _guard = self.runtime.enter();
            UdpSocket::from_std(std_socket)?
        };

        let link = Arc::new(DatagramLink {
            socket: Arc::new(socket),
            remote,
            session_id,
            route,
            max_datagram_size: self.max_datagram_size,
            receiver: Mutex::new(None),
        });
        link.arm_receive(&self.runtime);

        let mut bootstrap = Packet::new();
        bootstrap.write_i32(i32::from(session_id));
        link.send_raw(&self.runtime, bootstrap.into_bytes());

        info!(local = ?link.socket.local_addr().ok(), %remote, session_id, "Datagram transport bound");
        self.link = Some(link);
        Ok(())
    }

    /// Send `packet` as one datagram. Failures are logged and counted, never
    /// returned.
    pub fn send(&self, packet: Packet) {
        let Some(link) = &self.link else {
            debug!("Datagram transport not bound, dropping packet");
            return;
        };
        if packet.len() + 2 * HEADER_SIZE > self.max_datagram_size {
            self.metrics.send_failure();
            warn!(len = packet.len(), "Packet too large for a datagram, dropping");
            return;
        }
        link.send_raw(&self.runtime, wrap_datagram(link.session_id, packet));
    }

    /// Stop receiving and release the socket. Safe to call in any state.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.stop_receive();
            info!(remote = %link.remote, "Datagram transport closed");
        }
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for DatagramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramTransport")
            .field("bound", &self.is_bound())
            .field("session_id", &self.session_id())
            .finish()
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, route: InboundRoute, max_datagram_size: usize) {
    let mut buf = vec![0u8; max_datagram_size];
    loop {
        let received = match socket.recv(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "Error receiving datagram");
                route.events().link_lost(TransportKind::Datagram, e.to_string());
                return;
            }
        };

        match unwrap_datagram(&buf[..received]) {
            Ok(frame) => {
                route.metrics().frame_received(frame.len() as u64);
                route.deliver(frame);
            }
            Err(e) => {
                route.metrics().malformed_frame();
                warn!(error = %e, bytes = received, "Malformed datagram, disconnecting");
                route.events().link_lost(TransportKind::Datagram, e.to_string());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_strips_length() {
        let frame = unwrap_datagram(&[8, 0, 0, 0, 3, 0, 0, 0, 42, 0, 0, 0]).unwrap();
        assert_eq!(frame.as_bytes(), &[3, 0, 0, 0, 42, 0, 0, 0]);
        assert_eq!(frame.read_position(), 0);
    }

    #[test]
    fn test_unwrap_ignores_trailing_bytes() {
        let frame = unwrap_datagram(&[4, 0, 0, 0, 7, 0, 0, 0, 0xFF, 0xFF]).unwrap();
        assert_eq!(frame.as_bytes(), &[7, 0, 0, 0]);
    }

    #[test]
    fn test_unwrap_rejects_short_datagram() {
        assert!(matches!(
            unwrap_datagram(&[1, 2, 3]),
            Err(ProtocolError::MalformedDatagram(_))
        ));
        assert!(matches!(
            unwrap_datagram(&[]),
            Err(ProtocolError::MalformedDatagram(_))
        ));
    }

    #[test]
    fn test_unwrap_rejects_truncated_frame() {
        assert!(matches!(
            unwrap_datagram(&[16, 0, 0, 0, 1, 0, 0, 0]),
            Err(ProtocolError::Underflow { .. })
        ));
        assert!(matches!(
            unwrap_datagram(&[0xFF, 0xFF, 0xFF, 0xFF, 1]),
            Err(ProtocolError::MalformedFrame(-1))
        ));
    }

    #[test]
    fn test_wrap_prefixes_session_and_length() {
        let mut packet = Packet::with_id(7);
        packet.write_f32(1.5);
        let bytes = wrap_datagram(2, packet);

        assert_eq!(&bytes[..4], &[2, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[8, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[7, 0, 0, 0]);
        assert_eq!(&bytes[12..], &1.5f32.to_le_bytes());
    }
}
