//! # Connection Controller
//!
//! [`Client`] owns one session with the server: the stream and datagram
//! transports, the handler registry, the dispatch queue and the connection
//! state that UI code observes.
//!
//! Everything that touches session state happens on the thread that calls
//! [`Client::tick`]. I/O tasks only queue packets and post control events;
//! `tick` drains the queue, applies the events (link lost, welcome, kick) and
//! moves the connect sequence forward, so it never blocks the caller.
//!
//! ## Usage
//! ```rust,no_run
//! use multiplayer_transport::config::NetworkConfig;
//! use multiplayer_transport::protocol::packets::ServerPacket;
//! use multiplayer_transport::service::client::Client;
//!
//! # fn main() -> multiplayer_transport::error::Result<()> {
//! let mut client = Client::new(NetworkConfig::default())?;
//! client.register(ServerPacket::PvPEnabled.id(), |packet| {
//!     let enabled = packet.read_bool()?;
//!     println!("PvP enabled: {enabled}");
//!     Ok(())
//! })?;
//! client.set_endpoint("10.0.0.5", Some(26950), "Knight")?;
//! client.connect_to_server();
//!
//! loop {
//!     client.tick();
//!     // ... render a frame ...
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::events::{ControlEvent, EventSender, SessionEvent};
use crate::protocol::packets::{self, ServerPacket, Welcome};
use crate::protocol::{DispatchQueue, RegistryBuilder};
use crate::service::retry::ConnectSequence;
use crate::transport::{ConnectPoll, DatagramTransport, InboundRoute, StreamTransport};
use crate::utils::metrics::Metrics;

/// How long dropping a client waits for queued packets to reach the socket.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot published to status subscribers on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Attempt in progress, or the one that succeeded; 0 when disconnected
    pub attempt: u32,
    /// Set when the last connect sequence ran out of attempts
    pub gave_up: bool,
}

impl ConnectionStatus {
    /// Status line for a connection panel.
    pub fn describe(&self) -> &'static str {
        match self.state {
            ConnectionState::Connecting => "Connecting to server...",
            ConnectionState::Connected => "Connected to server.",
            ConnectionState::Disconnected if self.gave_up => "Could not connect to server.",
            ConnectionState::Disconnected => "Disconnected.",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Hook run on the consumer thread whenever a session is torn down.
pub type SessionResetHook = Box<dyn FnMut() + Send + 'static>;

struct Session {
    route: InboundRoute,
    sequence: ConnectSequence,
}

pub struct Client {
    config: NetworkConfig,
    handlers: RegistryBuilder,
    queue: DispatchQueue,
    metrics: Arc<Metrics>,
    status: watch::Sender<ConnectionStatus>,
    events_tx: mpsc::UnboundedSender<ControlEvent>,
    events_rx: mpsc::UnboundedReceiver<ControlEvent>,
    epoch: Arc<AtomicU64>,
    session: Option<Session>,
    session_id: Option<u8>,
    stream: StreamTransport,
    datagram: DatagramTransport,
    reset_hooks: Vec<SessionResetHook>,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl Client {
    /// Create a client with its own multi-threaded I/O runtime.
    ///
    /// The client must then be dropped outside of any async context.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("mp-client-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Self::build(config, handle, Some(runtime))
    }

    /// Create a client whose I/O tasks run on an existing runtime.
    pub fn with_handle(config: NetworkConfig, handle: Handle) -> Result<Self> {
        Self::build(config, handle, None)
    }

    fn build(config: NetworkConfig, handle: Handle, runtime: Option<Runtime>) -> Result<Self> {
        config.validate_strict()?;

        let metrics = Arc::new(Metrics::new());
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stream = StreamTransport::new(handle.clone(), config.transport.clone(), metrics.clone());
        let datagram = DatagramTransport::new(
            handle.clone(),
            config.transport.max_datagram_size,
            metrics.clone(),
        );

        Ok(Self {
            config,
            handlers: RegistryBuilder::new(),
            queue: DispatchQueue::new(),
            metrics,
            status,
            events_tx,
            events_rx,
            epoch: Arc::new(AtomicU64::new(0)),
            session: None,
            session_id: None,
            stream,
            datagram,
            reset_hooks: Vec::new(),
            handle,
            runtime,
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch connection status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Session id assigned by the server's welcome packet.
    pub fn session_id(&self) -> Option<u8> {
        self.session_id
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// The queue `tick` drains. Game code may enqueue its own actions on it.
    pub fn queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    /// Handle of the runtime the transports run on.
    pub fn runtime_handle(&self) -> &Handle {
        &self.handle
    }

    /// Register a handler for a server packet id.
    ///
    /// Handlers are captured when [`connect_to_server`](Self::connect_to_server)
    /// starts a session; registering during a session affects the next one.
    /// The welcome and kick packets are handled by the client itself.
    pub fn register<F>(&mut self, id: i32, handler: F) -> Result<()>
    where
        F: Fn(&mut Packet) -> Result<()> + Send + Sync + 'static,
    {
        if ServerPacket::is_reserved(id) {
            return Err(ProtocolError::ReservedPacketId(id));
        }
        self.handlers.register(id, handler);
        Ok(())
    }

    /// Run `hook` whenever a session is torn down, e.g. to destroy the
    /// remote players it spawned.
    pub fn on_session_reset<F>(&mut self, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.reset_hooks.push(Box::new(hook));
    }

    /// Update the connection details used by the next connect. Empty values
    /// keep the current ones.
    pub fn set_endpoint(&mut self, host: &str, port: Option<u16>, username: &str) -> Result<()> {
        let mut client = self.config.client.clone();
        if !host.is_empty() {
            client.host = host.to_string();
        }
        if let Some(port) = port {
            client.port = port;
        }
        if !username.is_empty() {
            client.username = username.to_string();
        }

        let errors = client.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::ConfigError(errors.join(", ")));
        }
        self.config.client = client;
        Ok(())
    }

    /// Start a connect sequence unless one is running or a session is open.
    #[instrument(skip(self), fields(host = %self.config.client.host, port = self.config.client.port))]
    pub fn connect_to_server(&mut self) {
        match self.state() {
            ConnectionState::Connected => {
                info!("Already connected to the server");
                return;
            }
            ConnectionState::Connecting => {
                info!("Connect already in progress");
                return;
            }
            ConnectionState::Disconnected => {}
        }

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let events = EventSender::new(epoch, self.events_tx.clone());
        let registry = self.session_handlers(&events).build();
        let route = InboundRoute::new(
            self.queue.clone(),
            Arc::new(registry),
            events,
            self.metrics.clone(),
            self.epoch.clone(),
        );

        info!("Connecting to server");
        let client = &self.config.client;
        self.session = Some(Session {
            route,
            sequence: ConnectSequence::new(client.connect_attempts, client.attempt_timeout),
        });
        self.publish(ConnectionState::Connecting, 0, false);
        self.advance_connect();
    }

    /// Run queued packet handlers, apply control events and advance the
    /// connect sequence. Returns the number of queued actions that ran.
    pub fn tick(&mut self) -> usize {
        let ran = self.queue.drain_and_run_all();
        self.process_events();
        self.advance_connect();
        ran
    }

    /// Send over the stream transport. Dropped with a debug log when no
    /// stream is open.
    pub fn send_reliable(&self, packet: Packet) {
        self.stream.send(packet);
    }

    /// Send over the datagram transport. Dropped with a debug log until the
    /// welcome handshake has bound it.
    pub fn send_unreliable(&self, packet: Packet) {
        self.datagram.send(packet);
    }

    /// Tear the session down. Safe to call repeatedly and in any state.
    pub fn disconnect(&mut self) {
        if self.session.is_none() && !self.stream.is_open() && !self.datagram.is_bound() {
            debug!("Already disconnected");
            return;
        }
        info!("Disconnecting from server");

        // Events and queued packets from this session are ignored from here on.
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.session = None;
        self.stream.abort_connect();

        if self.stream.is_open() {
            let session_id = self.session_id.unwrap_or(0);
            self.stream.send(packets::player_disconnected(session_id));
        }
        self.stream.disconnect();
        self.datagram.disconnect();

        for hook in &mut self.reset_hooks {
            hook();
        }

        self.session_id = None;
        self.metrics.disconnected();
        self.metrics.log_metrics();
        self.publish(ConnectionState::Disconnected, 0, false);
        info!("You have been disconnected from the server");
    }

    fn session_handlers(&self, events: &EventSender) -> RegistryBuilder {
        let mut handlers = self.handlers.clone();

        let welcome_events = events.clone();
        handlers.register(ServerPacket::Welcome.id(), move |packet| {
            let welcome = Welcome::read(packet)?;
            welcome_events.post(SessionEvent::Welcomed {
                session_id: welcome.session_id,
                message: welcome.message,
            });
            Ok(())
        });

        let kick_events = events.clone();
        handlers.register(ServerPacket::DisconnectPlayer.id(), move |_| {
            kick_events.post(SessionEvent::Kicked);
            Ok(())
        });

        handlers
    }

    fn process_events(&mut self) {
        while let Ok(ControlEvent { epoch, event }) = self.events_rx.try_recv() {
            if self.session.is_none() || epoch != self.epoch.load(Ordering::Acquire) {
                debug!(epoch, ?event, "Ignoring event from a closed session");
                continue;
            }

            match event {
                SessionEvent::LinkLost { transport, reason } => {
                    warn!(%transport, %reason, "Connection to server lost");
                    self.disconnect();
                }
                SessionEvent::Welcomed {
                    session_id,
                    message,
                } => self.on_welcome(session_id, &message),
                SessionEvent::Kicked => {
                    info!("Disconnected by the server");
                    self.disconnect();
                }
            }
        }
    }

    fn on_welcome(&mut self, session_id: u8, message: &str) {
        info!(session_id, message, "Welcome from server");
        self.session_id = Some(session_id);
        self.stream
            .send(packets::welcome_received(session_id, &self.config.client.username));

        let (Some(local), Some(remote), Some(session)) = (
            self.stream.local_addr(),
            self.stream.peer_addr(),
            self.session.as_ref(),
        ) else {
            warn!("Welcome received without an open stream");
            return;
        };

        if let Err(e) = self
            .datagram
            .bind(local.port(), remote, session_id, session.route.clone())
        {
            warn!(error = %e, "Could not bind datagram transport, continuing over stream only");
        }
    }

    fn advance_connect(&mut self) {
        if self.state() != ConnectionState::Connecting {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        loop {
            if session.sequence.in_flight() {
                let attempt = session.sequence.attempts();
                match self.stream.poll_connect(&session.route) {
                    ConnectPoll::Pending => {
                        if !session.sequence.expired(Instant::now()) {
                            return;
                        }
                        self.stream.abort_connect();
                        session.sequence.end_attempt();
                        warn!(attempt, "Connect attempt timed out");
                    }
                    ConnectPoll::Open => {
                        session.sequence.end_attempt();
                        self.metrics.connection_established();
                        info!(attempt, "Connected to server");
                        self.status.send_replace(ConnectionStatus {
                            state: ConnectionState::Connected,
                            attempt,
                            gave_up: false,
                        });
                        return;
                    }
                    ConnectPoll::Failed(e) => {
                        session.sequence.fail_attempt();
                        warn!(attempt, error = %e, "Connect attempt failed");
                    }
                    ConnectPoll::Idle => {
                        session.sequence.fail_attempt();
                        warn!(attempt, "Connect attempt vanished");
                    }
                }
                self.metrics.connect_failure();
            }

            if session.sequence.cooling_down(Instant::now()) {
                return;
            }

            let Some(attempt) = session.sequence.begin_attempt(Instant::now()) else {
                break;
            };
            self.metrics.connect_attempt();
            info!(attempt, "Connection attempt");
            self.status.send_replace(ConnectionStatus {
                state: ConnectionState::Connecting,
                attempt,
                gave_up: false,
            });

            let client = &self.config.client;
            match self
                .stream
                .begin_connect(&client.host, client.port, client.attempt_timeout)
            {
                Ok(()) => return,
                Err(e) => {
                    warn!(attempt, error = %e, "Connect attempt failed to start");
                    session.sequence.end_attempt();
                    self.metrics.connect_failure();
                }
            }
        }

        let attempts = session.sequence.attempts();
        warn!(attempts, "Could not connect to server, giving up");
        self.session = None;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.publish(ConnectionState::Disconnected, attempts, true);
    }

    fn publish(&self, state: ConnectionState, attempt: u32, gave_up: bool) {
        self.status.send_replace(ConnectionStatus {
            state,
            attempt,
            gave_up,
        });
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("status", &self.status())
            .field("session_id", &self.session_id)
            .field("stream", &self.stream)
            .field("datagram", &self.datagram)
            .finish()
    }
}
