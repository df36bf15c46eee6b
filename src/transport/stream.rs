//! # Stream Transport
//!
//! Reliable, ordered TCP connection to the server.
//!
//! Connecting is asynchronous: [`StreamTransport::begin_connect`] spawns the
//! attempt on the I/O runtime and returns at once, and the connection
//! controller picks up the outcome with [`StreamTransport::poll_connect`].
//! Once open, the socket is split into a reader task that feeds
//! [`PacketCodec`] frames into the session's [`InboundRoute`], and a writer
//! task draining an unbounded queue of outbound packets.
//!
//! ## State Machine
//! ```text
//! Idle ──begin_connect──> Connecting ──success──> Open ──disconnect──> Closed
//!   ^                          │                                        │
//!   └────────failure/abort─────┘                                        │
//!   Closed ──begin_connect──> Connecting                                │
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, instrument, warn};

use crate::config::TransportConfig;
use crate::core::codec::PacketCodec;
use crate::core::packet::{Packet, HEADER_SIZE};
use crate::error::constants::{ERR_CONNECTION_CLOSED, ERR_NO_ADDRESS};
use crate::error::{ProtocolError, Result};
use crate::protocol::events::TransportKind;
use crate::transport::InboundRoute;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Outcome of polling an in-flight connect.
#[derive(Debug)]
pub enum ConnectPoll {
    /// No connect in flight and no open connection
    Idle,
    Pending,
    Open,
    Failed(ProtocolError),
}

struct PendingConnect {
    result: oneshot::Receiver<Result<TcpStream>>,
    task: JoinHandle<()>,
}

struct OpenLink {
    outbound: mpsc::UnboundedSender<Packet>,
    reader: JoinHandle<()>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

pub struct StreamTransport {
    runtime: Handle,
    config: TransportConfig,
    metrics: Arc<Metrics>,
    state: StreamState,
    pending: Option<PendingConnect>,
    link: Option<OpenLink>,
}

impl StreamTransport {
    pub fn new(runtime: Handle, config: TransportConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            runtime,
            config,
            metrics,
            state: StreamState::Idle,
            pending: None,
            link: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().map(|link| link.local_addr)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().map(|link| link.peer_addr)
    }

    /// Start a connect attempt in the background.
    ///
    /// Fails synchronously only when the transport is already open. A
    /// previous attempt still in flight is abandoned.
    #[instrument(skip(self))]
    pub fn begin_connect(&mut self, host: &str, port: u16, attempt_timeout: Duration) -> Result<()> {
        if self.link.is_some() {
            return Err(ProtocolError::Custom(
                "stream transport is already open".to_string(),
            ));
        }
        self.abort_connect();

        let (tx, rx) = oneshot::channel();
        let host = host.to_string();
        let config = self.config.clone();
        let task = self.runtime.spawn(async move {
            let result = with_timeout_error(open_socket(host, port, config), attempt_timeout).await;
            // The receiver is gone when the attempt was abandoned.
            let _ = tx.send(result);
        });

        self.pending = Some(PendingConnect { result: rx, task });
        self.state = StreamState::Connecting;
        debug!("Connect attempt started");
        Ok(())
    }

    /// Check on the attempt started by [`begin_connect`](Self::begin_connect).
    ///
    /// On success the connection is opened and its I/O tasks start feeding
    /// `route`.
    pub fn poll_connect(&mut self, route: &InboundRoute) -> ConnectPoll {
        let Some(pending) = self.pending.as_mut() else {
            return match self.state {
                StreamState::Open => ConnectPoll::Open,
                _ => ConnectPoll::Idle,
            };
        };

        let outcome = match pending.result.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => return ConnectPoll::Pending,
            Err(oneshot::error::TryRecvError::Closed) => Err(ProtocolError::Custom(
                "connect task ended without a result".to_string(),
            )),
            Ok(result) => result,
        };
        self.pending = None;

        match outcome.and_then(|stream| self.open(stream, route)) {
            Ok(()) => ConnectPoll::Open,
            Err(e) => {
                self.state = StreamState::Idle;
                ConnectPoll::Failed(e)
            }
        }
    }

    /// Abandon an in-flight connect attempt.
    pub fn abort_connect(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
            if self.state == StreamState::Connecting {
                self.state = StreamState::Idle;
            }
        }
    }

    fn open(&mut self, stream: TcpStream, route: &InboundRoute) -> Result<()> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let codec = PacketCodec::new(self.config.max_frame_size).with_metrics(self.metrics.clone());
        let frames = FramedRead::new(read_half, codec.clone());
        let sink = FramedWrite::new(write_half, codec);
        let (outbound, queued) = mpsc::unbounded_channel();

        let reader = self.runtime.spawn(read_loop(frames, route.clone()));
        // Detached: the writer ends on its own once `outbound` is dropped.
        self.runtime
            .spawn(write_loop(sink, queued, self.metrics.clone()));

        self.link = Some(OpenLink {
            outbound,
            reader,
            local_addr,
            peer_addr,
        });
        self.state = StreamState::Open;
        info!(local = %local_addr, peer = %peer_addr, "Stream connection established");
        Ok(())
    }

    /// Queue `packet` for sending. The frame length is written by the codec.
    ///
    /// Failures are logged and counted, never returned.
    pub fn send(&self, packet: Packet) {
        let Some(link) = &self.link else {
            debug!("Stream transport not open, dropping packet");
            return;
        };
        if link.outbound.send(packet).is_err() {
            self.metrics.send_failure();
            warn!("Stream writer has stopped, dropping packet");
        }
    }

    /// Close the connection. Packets already queued are still flushed before
    /// the write half shuts down. Safe to call in any state.
    pub fn disconnect(&mut self) {
        self.abort_connect();
        if let Some(link) = self.link.take() {
            link.reader.abort();
            drop(link.outbound);
            info!(peer = %link.peer_addr, "Stream connection closed");
        }
        if self.state == StreamState::Open {
            self.state = StreamState::Closed;
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("state", &self.state)
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

async fn open_socket(host: String, port: u16, config: TransportConfig) -> Result<TcpStream> {
    let mut last_error = None;

    for addr in lookup_host((host.as_str(), port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_recv_buffer_size(buffer_size(config.receive_buffer_size))?;
        socket.set_send_buffer_size(buffer_size(config.send_buffer_size))?;

        match socket.connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(config.nodelay)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "Address refused connection");
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .map(ProtocolError::Io)
        .unwrap_or_else(|| ProtocolError::Custom(ERR_NO_ADDRESS.to_string())))
}

fn buffer_size(size: usize) -> u32 {
    u32::try_from(size).unwrap_or(u32::MAX)
}

async fn read_loop(mut frames: FramedRead<OwnedReadHalf, PacketCodec>, route: InboundRoute) {
    loop {
        match frames.next().await {
            Some(Ok(frame)) => route.deliver(frame),
            Some(Err(e)) => {
                warn!(error = %e, "Error receiving stream data");
                route.events().link_lost(TransportKind::Stream, e.to_string());
                return;
            }
            None => {
                info!("Server closed the stream connection");
                route
                    .events()
                    .link_lost(TransportKind::Stream, ERR_CONNECTION_CLOSED);
                return;
            }
        }
    }
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, PacketCodec>,
    mut queued: mpsc::UnboundedReceiver<Packet>,
    metrics: Arc<Metrics>,
) {
    while let Some(packet) = queued.recv().await {
        let wire_len = (packet.len() + HEADER_SIZE) as u64;
        match sink.send(packet).await {
            Ok(()) => metrics.packet_sent(wire_len),
            Err(e) => {
                metrics.send_failure();
                warn!(error = %e, "Error sending data to server via stream");
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "Stream write half did not shut down cleanly");
    }
}
