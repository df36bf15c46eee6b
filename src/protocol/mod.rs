//! # Protocol Layer
//!
//! Everything between a parsed frame and the game code that consumes it.
//!
//! ## Components
//! - **Dispatcher**: packet id → handler registry, frozen once per session
//! - **Dispatch Queue**: hand-off from I/O tasks to the consumer thread
//! - **Events**: control events from I/O tasks to the connection controller
//! - **Packets**: packet id catalog and the session packets the core speaks

pub mod dispatch_queue;
pub mod dispatcher;
pub mod events;
pub mod packets;


pub use dispatch_queue::{DispatchQueue, PendingAction};
pub use dispatcher::{HandlerFn, PacketRegistry, RegistryBuilder};
pub use events::{ControlEvent, EventSender, SessionEvent, TransportKind};
pub use packets::{ClientPacket, ServerPacket, Welcome};
