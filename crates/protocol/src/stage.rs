//! Protocol stages and packet directions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a connection's lifecycle
///
/// Each stage restricts which packet types are valid on the wire.
///
/// ```text
/// Handshake ─┬─> Status
///            └─> Login ─> Configuration ─> Play
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolStage {
    Handshake = 0,
    Status = 1,
    Login = 2,
    Configuration = 3,
    Play = 4,
}

impl ProtocolStage {
    pub const ALL: [ProtocolStage; 5] = [
        Self::Handshake,
        Self::Status,
        Self::Login,
        Self::Configuration,
        Self::Play,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Handshake),
            1 => Some(Self::Status),
            2 => Some(Self::Login),
            3 => Some(Self::Configuration),
            4 => Some(Self::Play),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Status => "status",
            Self::Login => "login",
            Self::Configuration => "configuration",
            Self::Play => "play",
        }
    }

    /// Stage name as it appears in legacy packet class names
    /// (`PacketHandshakingInSetProtocol`, `PacketPlayOutChat`)
    pub fn legacy_name(&self) -> &'static str {
        match self {
            Self::Handshake => "Handshaking",
            Self::Status => "Status",
            Self::Login => "Login",
            Self::Configuration => "Configuration",
            Self::Play => "Play",
        }
    }

    /// Parse a stage from its lowercase name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == name)
    }
}

impl fmt::Display for ProtocolStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction a packet travels relative to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Sent by the client, received by the server (serverbound)
    Inbound,
    /// Sent by the server to the client (clientbound)
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// `In` / `Out`, as used by legacy class names
    pub fn legacy_name(&self) -> &'static str {
        match self {
            Self::Inbound => "In",
            Self::Outbound => "Out",
        }
    }

    /// `Serverbound` / `Clientbound`, as used by modern class names
    pub fn modern_name(&self) -> &'static str {
        match self {
            Self::Inbound => "Serverbound",
            Self::Outbound => "Clientbound",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Inbound => Self::Outbound,
            Self::Outbound => Self::Inbound,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_u8_conversion() {
        for stage in ProtocolStage::ALL {
            assert_eq!(ProtocolStage::from_u8(stage.as_u8()), Some(stage));
        }
        assert_eq!(ProtocolStage::from_u8(9), None);
    }

    #[test]
    fn test_stage_from_name() {
        assert_eq!(ProtocolStage::from_name("play"), Some(ProtocolStage::Play));
        assert_eq!(ProtocolStage::from_name("PLAY"), None);
    }

    #[test]
    fn test_direction_names() {
        assert_eq!(Direction::Inbound.legacy_name(), "In");
        assert_eq!(Direction::Outbound.modern_name(), "Clientbound");
        assert_eq!(Direction::Inbound.opposite(), Direction::Outbound);
    }
}
