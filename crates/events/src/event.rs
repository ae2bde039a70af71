//! # Interception Events
//!
//! A [`PacketEvent`] wraps one packet for one dispatch pass. Listeners may
//! inspect it, rewrite its fields, replace it or cancel it. Listeners at
//! [`ListenerPriority::MONITOR`] see it read-only.

use crate::container::PacketContainer;
use packettap_core::{AccessError, ConnectionId};
use packettap_protocol::PacketType;
use std::fmt;

/// Ordering key of a listener; higher values run first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerPriority(pub i32);

impl ListenerPriority {
    pub const HIGHEST: Self = Self(100);
    pub const HIGH: Self = Self(50);
    pub const NORMAL: Self = Self(0);
    pub const LOW: Self = Self(-50);
    pub const LOWEST: Self = Self(-100);
    /// Runs after every other priority and may not modify the event
    pub const MONITOR: Self = Self(i32::MIN);

    pub fn is_monitor(&self) -> bool {
        *self == Self::MONITOR
    }
}

impl Default for ListenerPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for ListenerPriority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ListenerPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::HIGHEST => f.write_str("HIGHEST"),
            Self::HIGH => f.write_str("HIGH"),
            Self::NORMAL => f.write_str("NORMAL"),
            Self::LOW => f.write_str("LOW"),
            Self::LOWEST => f.write_str("LOWEST"),
            Self::MONITOR => f.write_str("MONITOR"),
            Self(value) => write!(f, "{}", value),
        }
    }
}

/// One packet passing through the listeners
pub struct PacketEvent {
    packet: PacketContainer,
    connection: Option<ConnectionId>,
    player: Option<String>,
    cancelled: bool,
    modified: bool,
    read_only: bool,
}

impl PacketEvent {
    pub fn new(packet: PacketContainer, connection: Option<ConnectionId>) -> Self {
        Self {
            packet,
            connection,
            player: None,
            cancelled: false,
            modified: false,
            read_only: false,
        }
    }

    /// Attach the name of the player on the connection, when known
    pub fn with_player(mut self, player: Option<String>) -> Self {
        self.player = player;
        self
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet.packet_type()
    }

    /// Connection the packet travels on; `None` for packets not bound to one
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    pub fn packet(&self) -> &PacketContainer {
        &self.packet
    }

    /// Mutable access to the packet
    ///
    /// Fails with `ReadOnly` for monitor listeners.
    pub fn packet_mut(&mut self) -> Result<&mut PacketContainer, AccessError> {
        self.check_writable()?;
        self.modified = true;
        Ok(&mut self.packet)
    }

    /// Replace the packet with another packet of the same type
    pub fn set_packet(&mut self, packet: PacketContainer) -> Result<(), AccessError> {
        self.check_writable()?;
        if packet.packet_type() != self.packet.packet_type() {
            return Err(AccessError::WrongTarget {
                expected: self.packet.packet_type().to_string(),
                found: packet.packet_type().to_string(),
            });
        }
        self.packet = packet;
        self.modified = true;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) -> Result<(), AccessError> {
        self.check_writable()?;
        self.cancelled = cancelled;
        Ok(())
    }

    /// Suppress the packet: it is neither forwarded nor delivered
    pub fn cancel(&mut self) -> Result<(), AccessError> {
        self.set_cancelled(true)
    }

    /// Whether any listener asked for mutable access
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn into_packet(self) -> PacketContainer {
        self.packet
    }

    fn check_writable(&self) -> Result<(), AccessError> {
        if self.read_only {
            return Err(AccessError::ReadOnly);
        }
        Ok(())
    }
}

impl fmt::Debug for PacketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketEvent")
            .field("packet", &self.packet)
            .field("connection", &self.connection)
            .field("cancelled", &self.cancelled)
            .field("read_only", &self.read_only)
            .finish()
    }
}
