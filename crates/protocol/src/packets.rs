//! # Packet Catalogue
//!
//! Every packet type the engine knows how to resolve, grouped by stage and
//! direction. `client` holds serverbound packets (sent by the client),
//! `server` holds clientbound packets (sent by the server).
//!
//! Stems are listed newest first. The modern shim tries them in order, the
//! legacy shim prefers the last one.

use crate::packet_type::PacketType;
use crate::stage::{Direction, ProtocolStage};

macro_rules! packet {
    ($stage:ident, $dir:ident, $ident:ident, $name:literal, [$($stem:literal),+ $(,)?]) => {
        pub const $ident: PacketType = PacketType::new(
            ProtocolStage::$stage,
            Direction::$dir,
            $name,
            &[$($stem),+],
        );
    };
}

pub mod handshake {
    pub mod client {
        use super::super::*;

        packet!(Handshake, Inbound, SET_PROTOCOL, "SetProtocol", ["Intention", "SetProtocol"]);
    }
}

pub mod status {
    pub mod client {
        use super::super::*;

        packet!(Status, Inbound, START, "Start", ["StatusRequest", "Start"]);
        packet!(Status, Inbound, PING, "Ping", ["PingRequest", "Ping"]);
    }

    pub mod server {
        use super::super::*;

        packet!(Status, Outbound, SERVER_INFO, "ServerInfo", ["StatusResponse", "ServerInfo"]);
        packet!(Status, Outbound, PONG, "Pong", ["PongResponse", "Pong"]);
    }
}

pub mod login {
    pub mod client {
        use super::super::*;

        packet!(Login, Inbound, START, "Start", ["Hello", "Start"]);
        packet!(Login, Inbound, ENCRYPTION_BEGIN, "EncryptionBegin", ["Key", "EncryptionBegin"]);
        packet!(Login, Inbound, LOGIN_ACK, "LoginAck", ["LoginAcknowledged"]);
    }

    pub mod server {
        use super::super::*;

        packet!(Login, Outbound, DISCONNECT, "Disconnect", ["LoginDisconnect", "Disconnect"]);
        packet!(Login, Outbound, ENCRYPTION_BEGIN, "EncryptionBegin", ["Hello", "EncryptionBegin"]);
        packet!(Login, Outbound, SUCCESS, "Success", ["GameProfile", "Success"]);
        packet!(Login, Outbound, SET_COMPRESSION, "SetCompression", ["LoginCompression", "SetCompression"]);
    }
}

pub mod configuration {
    pub mod client {
        use super::super::*;

        packet!(Configuration, Inbound, FINISH_CONFIGURATION, "FinishConfiguration", ["FinishConfiguration"]);
        packet!(Configuration, Inbound, KEEP_ALIVE, "KeepAlive", ["KeepAlive"]);
    }

    pub mod server {
        use super::super::*;

        packet!(Configuration, Outbound, FINISH_CONFIGURATION, "FinishConfiguration", ["FinishConfiguration"]);
        packet!(Configuration, Outbound, KEEP_ALIVE, "KeepAlive", ["KeepAlive"]);
        packet!(Configuration, Outbound, DISCONNECT, "Disconnect", ["Disconnect"]);
    }
}

pub mod play {
    pub mod client {
        use super::super::*;

        packet!(Play, Inbound, CHAT, "Chat", ["Chat"]);
        packet!(Play, Inbound, KEEP_ALIVE, "KeepAlive", ["KeepAlive"]);
        packet!(Play, Inbound, POSITION, "Position", ["MovePlayerPos", "Position"]);
        packet!(Play, Inbound, USE_ENTITY, "UseEntity", ["Interact", "UseEntity"]);
    }

    pub mod server {
        use super::super::*;

        packet!(Play, Outbound, LOGIN, "Login", ["Login"]);
        packet!(Play, Outbound, CHAT, "Chat", ["PlayerChat", "Chat"]);
        packet!(Play, Outbound, SYSTEM_CHAT, "SystemChat", ["SystemChat"]);
        packet!(Play, Outbound, KEEP_ALIVE, "KeepAlive", ["KeepAlive"]);
        packet!(Play, Outbound, SPAWN_ENTITY, "SpawnEntity", ["AddEntity", "SpawnEntity"]);
        packet!(Play, Outbound, REL_ENTITY_MOVE, "RelEntityMove", ["MoveEntityPos", "RelEntityMove"]);
        packet!(Play, Outbound, ENTITY_DESTROY, "EntityDestroy", ["RemoveEntities", "EntityDestroy"]);
        packet!(Play, Outbound, KICK_DISCONNECT, "KickDisconnect", ["Disconnect", "KickDisconnect"]);
    }
}

const ALL: &[PacketType] = &[
    handshake::client::SET_PROTOCOL,
    status::client::START,
    status::client::PING,
    status::server::SERVER_INFO,
    status::server::PONG,
    login::client::START,
    login::client::ENCRYPTION_BEGIN,
    login::client::LOGIN_ACK,
    login::server::DISCONNECT,
    login::server::ENCRYPTION_BEGIN,
    login::server::SUCCESS,
    login::server::SET_COMPRESSION,
    configuration::client::FINISH_CONFIGURATION,
    configuration::client::KEEP_ALIVE,
    configuration::server::FINISH_CONFIGURATION,
    configuration::server::KEEP_ALIVE,
    configuration::server::DISCONNECT,
    play::client::CHAT,
    play::client::KEEP_ALIVE,
    play::client::POSITION,
    play::client::USE_ENTITY,
    play::server::LOGIN,
    play::server::CHAT,
    play::server::SYSTEM_CHAT,
    play::server::KEEP_ALIVE,
    play::server::SPAWN_ENTITY,
    play::server::REL_ENTITY_MOVE,
    play::server::ENTITY_DESTROY,
    play::server::KICK_DISCONNECT,
];

impl PacketType {
    /// All catalogued packet types
    pub fn all() -> &'static [PacketType] {
        ALL
    }

    /// Catalogued packet types for one stage and direction
    pub fn of(stage: ProtocolStage, direction: Direction) -> impl Iterator<Item = PacketType> {
        ALL.iter()
            .copied()
            .filter(move |ty| ty.stage() == stage && ty.direction() == direction)
    }

    /// Find a catalogued packet type by its logical name
    pub fn lookup(stage: ProtocolStage, direction: Direction, name: &str) -> Option<PacketType> {
        Self::of(stage, direction).find(|ty| ty.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_has_no_duplicates() {
        let unique: HashSet<_> = PacketType::all().iter().collect();
        assert_eq!(unique.len(), PacketType::all().len());
    }

    #[test]
    fn test_chat_exists_in_both_directions() {
        assert_ne!(play::client::CHAT, play::server::CHAT);
        assert_eq!(play::server::CHAT.stems(), &["PlayerChat", "Chat"]);
    }

    #[test]
    fn test_lookup() {
        let found = PacketType::lookup(ProtocolStage::Play, Direction::Outbound, "RelEntityMove");
        assert_eq!(found, Some(play::server::REL_ENTITY_MOVE));
        assert_eq!(PacketType::lookup(ProtocolStage::Status, Direction::Outbound, "Chat"), None);
    }

    #[test]
    fn test_of_filters_by_stage_and_direction() {
        assert!(PacketType::of(ProtocolStage::Handshake, Direction::Inbound).count() == 1);
        assert!(PacketType::of(ProtocolStage::Handshake, Direction::Outbound).next().is_none());
    }
}
