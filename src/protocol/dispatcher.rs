use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handler for one packet id. Receives the frame with the read cursor just
/// past the packet id.
pub type HandlerFn = dyn Fn(&mut Packet) -> Result<()> + Send + Sync + 'static;

/// Collects handlers before a session starts.
///
/// Handlers are stored behind `Arc`, so building a registry snapshot per
/// session is cheap and leaves the builder reusable for the next connect.
#[derive(Clone, Default)]
pub struct RegistryBuilder {
    handlers: HashMap<i32, Arc<HandlerFn>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `id`, replacing any previous handler.
    pub fn register<F>(&mut self, id: i32, handler: F) -> &mut Self
    where
        F: Fn(&mut Packet) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(id, Arc::new(handler));
        self
    }

    pub fn unregister(&mut self, id: i32) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Freeze the current handlers into a read-only registry.
    pub fn build(&self) -> PacketRegistry {
        PacketRegistry {
            handlers: self.handlers.clone(),
        }
    }
}

/// Immutable packet id → handler table for one session.
pub struct PacketRegistry {
    handlers: HashMap<i32, Arc<HandlerFn>>,
}

impl PacketRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Invoke the handler registered for `id`.
    ///
    /// Returns [`ProtocolError::UnknownPacket`] when nothing is registered; the
    /// packet is dropped either way.
    pub fn dispatch(&self, id: i32, packet: &mut Packet) -> Result<()> {
        self.handlers
            .get(&id)
            .ok_or(ProtocolError::UnknownPacket(id))
            .and_then(|handler| handler(packet))
    }

    /// Read the packet id from the head of `frame` and dispatch the rest.
    pub fn dispatch_frame(&self, mut frame: Packet) -> Result<i32> {
        let id = frame.read_i32()?;
        self.dispatch(id, &mut frame)?;
        Ok(id)
    }
}

impl fmt::Debug for PacketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("PacketRegistry").field("ids", &ids).finish()
    }
}
