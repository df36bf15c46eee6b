//! # Packet Catalog
//!
//! Packet ids shared with the server, plus the handful of session packets the
//! transport core reads and writes itself. Payloads of every other packet
//! belong to the game-state handlers that register for them.
//!
//! ## Session packets
//! ```text
//! Welcome          (server) [message: string][session id: i32]
//! DisconnectPlayer (server) []
//! WelcomeReceived  (client) [session id: i32][username: string]
//! PlayerDisconnected (client) [session id: i32]
//! ```

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};

/// Packets sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ServerPacket {
    Welcome = 1,
    SpawnPlayer,
    TextureFragment,
    TextureRequest,
    DestroyPlayer,
    PvPEnabled,
    PlayerPosition,
    PlayerScale,
    PlayerAnimation,
    HealthUpdated,
    CharmsUpdated,
    PlayerDisconnected,
    DisconnectPlayer,
}

impl ServerPacket {
    pub const ALL: [ServerPacket; 13] = [
        ServerPacket::Welcome,
        ServerPacket::SpawnPlayer,
        ServerPacket::TextureFragment,
        ServerPacket::TextureRequest,
        ServerPacket::DestroyPlayer,
        ServerPacket::PvPEnabled,
        ServerPacket::PlayerPosition,
        ServerPacket::PlayerScale,
        ServerPacket::PlayerAnimation,
        ServerPacket::HealthUpdated,
        ServerPacket::CharmsUpdated,
        ServerPacket::PlayerDisconnected,
        ServerPacket::DisconnectPlayer,
    ];

    pub fn id(self) -> i32 {
        self as i32
    }

    /// Ids handled by the connection controller itself.
    pub fn is_reserved(id: i32) -> bool {
        id == ServerPacket::Welcome.id() || id == ServerPacket::DisconnectPlayer.id()
    }
}

impl TryFrom<i32> for ServerPacket {
    type Error = ProtocolError;

    fn try_from(id: i32) -> Result<Self> {
        ServerPacket::ALL
            .into_iter()
            .find(|packet| packet.id() == id)
            .ok_or(ProtocolError::UnknownPacket(id))
    }
}

/// Packets sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ClientPacket {
    WelcomeReceived = 1,
    PlayerPosition,
    PlayerScale,
    PlayerAnimation,
    SceneChanged,
    HealthUpdated,
    CharmsUpdated,
    PlayerDisconnected,
}

impl ClientPacket {
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Start an outbound packet of this kind.
    pub fn packet(self) -> Packet {
        Packet::with_id(self.id())
    }
}

/// Contents of the server's welcome packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    pub message: String,
    pub session_id: u8,
}

impl Welcome {
    /// Parse the fields following the packet id.
    pub fn read(packet: &mut Packet) -> Result<Self> {
        let message = packet.read_string()?;
        let raw_id = packet.read_i32()?;
        let session_id = u8::try_from(raw_id)
            .map_err(|_| ProtocolError::InvalidField(format!("session id {raw_id} out of range")))?;
        Ok(Self {
            message,
            session_id,
        })
    }

    /// Build the packet as the server sends it (used by tests and tools).
    pub fn to_packet(&self) -> Packet {
        let mut packet = Packet::with_id(ServerPacket::Welcome.id());
        packet.write_string(&self.message);
        packet.write_i32(i32::from(self.session_id));
        packet
    }
}

/// Acknowledge the welcome and announce the player's name.
pub fn welcome_received(session_id: u8, username: &str) -> Packet {
    let mut packet = ClientPacket::WelcomeReceived.packet();
    packet.write_i32(i32::from(session_id));
    packet.write_string(username);
    packet
}

/// Tell the server this session is leaving.
pub fn player_disconnected(session_id: u8) -> Packet {
    let mut packet = ClientPacket::PlayerDisconnected.packet();
    packet.write_i32(i32::from(session_id));
    packet
}
