//! Control events posted from I/O tasks and session handlers to the connection
//! controller. They are consumed on the consumer thread during `Client::tick`.

use std::fmt;

use tokio::sync::mpsc;

/// Which transport raised an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stream,
    Datagram,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stream => f.write_str("stream"),
            TransportKind::Datagram => f.write_str("datagram"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A transport's receive side failed or the peer closed it.
    LinkLost {
        transport: TransportKind,
        reason: String,
    },
    /// The server assigned this client a session id.
    Welcomed { session_id: u8, message: String },
    /// The server asked this client to leave.
    Kicked,
}

/// An event tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub epoch: u64,
    pub event: SessionEvent,
}

/// Cloneable sending half handed to transports and built-in handlers.
#[derive(Debug, Clone)]
pub struct EventSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl EventSender {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<ControlEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Post `event`. A controller that has gone away is not an error.
    pub fn post(&self, event: SessionEvent) {
        let _ = self.tx.send(ControlEvent {
            epoch: self.epoch,
            event,
        });
    }

    pub fn link_lost(&self, transport: TransportKind, reason: impl Into<String>) {
        self.post(SessionEvent::LinkLost {
            transport,
            reason: reason.into(),
        });
    }
}
