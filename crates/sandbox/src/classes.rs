//! # Sandbox Class Tables
//!
//! The packet classes a sandbox server defines, per version family.
//!
//! | Family | Versions | Naming                         | Notes                                   |
//! |--------|----------|--------------------------------|-----------------------------------------|
//! | legacy | < 1.17   | `PacketPlayInChat`             | `RelEntityMove` inherits all its fields |
//! | modern | >= 1.17  | `ServerboundChatPacket`        | system chat lives in a renamed class     |
//!
//! Configuration packets and `LoginAcknowledged` only exist on versions with
//! a configuration stage.

use packettap_protocol::{packets, PacketType, ServerVersion};
use packettap_reflect::{ClassDef, ClassHandle, ClassTable, ValueType};
use std::sync::Arc;

/// Name of the class every sandbox packet class extends
pub const PACKET_BASE: &str = "Packet";

/// Class the modern sandbox uses for system chat; no naming rule finds it
pub const RENAMED_SYSTEM_CHAT: &str = "ClientboundSystemMessagePacket";

/// Class implementing one packet type on the sandbox server
#[derive(Debug, Clone)]
pub struct HostPacket {
    pub packet: PacketType,
    pub class: ClassHandle,
}

struct TableBuilder {
    classes: ClassTable,
    base: ClassHandle,
    packets: Vec<HostPacket>,
}

impl TableBuilder {
    fn new() -> Self {
        let classes = ClassTable::new();
        let base = classes.register(ClassDef::builder(PACKET_BASE).build());
        Self {
            classes,
            base,
            packets: Vec::new(),
        }
    }

    fn class(&self, name: &str, parent: &ClassHandle, fields: &[(&str, ValueType)]) -> ClassHandle {
        let builder = fields
            .iter()
            .fold(ClassDef::builder(name).extends(parent), |builder, (field, ty)| {
                builder.field(*field, ty.clone())
            });
        self.classes.register(builder.build())
    }

    fn packet(&mut self, packet: PacketType, name: &str, fields: &[(&str, ValueType)]) -> ClassHandle {
        let class = self.class(name, &self.base, fields);
        self.map(packet, &class);
        class
    }

    fn map(&mut self, packet: PacketType, class: &ClassHandle) {
        self.packets.push(HostPacket {
            packet,
            class: class.clone(),
        });
    }

    fn enumeration(&self, name: &str, constants: &[&str]) {
        self.classes.register(ClassDef::enumeration(name, constants.iter().copied()));
    }

    fn finish(self) -> (Arc<ClassTable>, Vec<HostPacket>) {
        (Arc::new(self.classes), self.packets)
    }
}

/// Build the class table and packet mapping of a sandbox server
pub fn build(version: ServerVersion) -> (Arc<ClassTable>, Vec<HostPacket>) {
    if version.at_least(ServerVersion::MOJANG_MAPPINGS) {
        modern(version)
    } else {
        legacy()
    }
}

fn legacy() -> (Arc<ClassTable>, Vec<HostPacket>) {
    use ValueType::*;

    let mut table = TableBuilder::new();
    table.enumeration("EnumGamemode", &["SURVIVAL", "CREATIVE", "ADVENTURE", "SPECTATOR"]);

    table.packet(
        packets::handshake::client::SET_PROTOCOL,
        "PacketHandshakingInSetProtocol",
        &[("a", Int), ("hostname", String), ("port", Int), ("nextState", Int)],
    );

    table.packet(packets::status::client::START, "PacketStatusInStart", &[]);
    table.packet(packets::status::client::PING, "PacketStatusInPing", &[("a", Long)]);
    table.packet(packets::status::server::SERVER_INFO, "PacketStatusOutServerInfo", &[("b", String)]);
    table.packet(packets::status::server::PONG, "PacketStatusOutPong", &[("a", Long)]);

    table.packet(packets::login::client::START, "PacketLoginInStart", &[("a", String)]);
    table.packet(packets::login::server::DISCONNECT, "PacketLoginOutDisconnect", &[("a", String)]);
    table.packet(
        packets::login::server::SUCCESS,
        "PacketLoginOutSuccess",
        &[("uuid", String), ("name", String)],
    );

    table.packet(packets::play::client::CHAT, "PacketPlayInChat", &[("a", String)]);
    table.packet(packets::play::client::KEEP_ALIVE, "PacketPlayInKeepAlive", &[("a", Long)]);
    table.packet(
        packets::play::client::POSITION,
        "PacketPlayInPosition",
        &[("x", Double), ("y", Double), ("z", Double), ("f", Bool)],
    );

    table.packet(
        packets::play::server::LOGIN,
        "PacketPlayOutLogin",
        &[("a", Int), ("b", Bool), ("c", ValueType::enumeration("EnumGamemode"))],
    );
    table.packet(
        packets::play::server::CHAT,
        "PacketPlayOutChat",
        &[("a", String), ("b", Byte), ("c", String)],
    );
    table.packet(packets::play::server::KEEP_ALIVE, "PacketPlayOutKeepAlive", &[("a", Long)]);
    table.packet(
        packets::play::server::SPAWN_ENTITY,
        "PacketPlayOutSpawnEntity",
        &[("a", Int), ("b", String), ("c", Double), ("d", Double), ("e", Double)],
    );
    let entity = table.class(
        "PacketPlayOutEntity",
        &table.base,
        &[("a", Int), ("b", Short), ("c", Short), ("d", Short), ("g", Bool)],
    );
    let rel_move = table.class("PacketPlayOutRelEntityMove", &entity, &[]);
    table.map(packets::play::server::REL_ENTITY_MOVE, &rel_move);
    table.packet(
        packets::play::server::KICK_DISCONNECT,
        "PacketPlayOutKickDisconnect",
        &[("a", String)],
    );

    table.finish()
}

fn modern(version: ServerVersion) -> (Arc<ClassTable>, Vec<HostPacket>) {
    use ValueType::*;

    let mut table = TableBuilder::new();
    table.enumeration("GameType", &["SURVIVAL", "CREATIVE", "ADVENTURE", "SPECTATOR"]);

    table.packet(
        packets::handshake::client::SET_PROTOCOL,
        "ServerboundIntentionPacket",
        &[("protocolVersion", Int), ("hostName", String), ("port", Int), ("intention", Int)],
    );

    table.packet(packets::status::client::START, "ServerboundStatusRequestPacket", &[]);
    table.packet(packets::status::client::PING, "ServerboundPingRequestPacket", &[("time", Long)]);
    table.packet(
        packets::status::server::SERVER_INFO,
        "ClientboundStatusResponsePacket",
        &[("status", String)],
    );
    table.packet(packets::status::server::PONG, "ClientboundPongResponsePacket", &[("time", Long)]);

    table.packet(
        packets::login::client::START,
        "ServerboundHelloPacket",
        &[("name", String), ("profileId", String)],
    );
    table.packet(
        packets::login::server::DISCONNECT,
        "ClientboundLoginDisconnectPacket",
        &[("reason", String)],
    );
    table.packet(
        packets::login::server::SUCCESS,
        "ClientboundGameProfilePacket",
        &[("uuid", String), ("name", String)],
    );

    if version.has_configuration_stage() {
        table.packet(packets::login::client::LOGIN_ACK, "ServerboundLoginAcknowledgedPacket", &[]);
        table.packet(
            packets::configuration::client::FINISH_CONFIGURATION,
            "ServerboundFinishConfigurationPacket",
            &[],
        );
        table.packet(
            packets::configuration::server::FINISH_CONFIGURATION,
            "ClientboundFinishConfigurationPacket",
            &[],
        );
    }

    table.packet(
        packets::play::client::CHAT,
        "ServerboundChatPacket",
        &[("message", String), ("timeStamp", Long)],
    );
    table.packet(packets::play::client::KEEP_ALIVE, "ServerboundKeepAlivePacket", &[("id", Long)]);
    table.packet(
        packets::play::client::POSITION,
        "ServerboundMovePlayerPosPacket",
        &[("x", Double), ("y", Double), ("z", Double), ("onGround", Bool)],
    );

    table.packet(
        packets::play::server::LOGIN,
        "ClientboundLoginPacket",
        &[("playerId", Int), ("hardcore", Bool), ("gameType", ValueType::enumeration("GameType"))],
    );
    table.packet(
        packets::play::server::CHAT,
        "ClientboundPlayerChatPacket",
        &[("body", String), ("index", Int)],
    );
    table.packet(
        packets::play::server::SYSTEM_CHAT,
        RENAMED_SYSTEM_CHAT,
        &[("content", String), ("overlay", Bool)],
    );
    table.packet(packets::play::server::KEEP_ALIVE, "ClientboundKeepAlivePacket", &[("id", Long)]);
    table.packet(
        packets::play::server::SPAWN_ENTITY,
        "ClientboundAddEntityPacket",
        &[("id", Int), ("uuid", String), ("x", Double), ("y", Double), ("z", Double)],
    );
    table.packet(
        packets::play::server::REL_ENTITY_MOVE,
        "ClientboundMoveEntityPosPacket",
        &[("entityId", Int), ("xa", Short), ("ya", Short), ("za", Short), ("onGround", Bool)],
    );
    table.packet(
        packets::play::server::KICK_DISCONNECT,
        "ClientboundDisconnectPacket",
        &[("reason", String)],
    );

    table.finish()
}
