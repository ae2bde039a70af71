//! # Sandbox Host
//!
//! A small versioned game server the engine can be pointed at. It owns the
//! class table of its version, knows which class implements which packet
//! type, and decides what its pipeline looks like.
//!
//! Modern versions expose their packet mapping through
//! [`HostIntrospection::declared_class`], except for the renamed system chat
//! class, which only a structural search can find. Legacy versions declare
//! nothing.

use crate::classes::{self, HostPacket, RENAMED_SYSTEM_CHAT};
use packettap_core::{Result, TapError};
use packettap_protocol::{packets, Direction, PacketType, ProtocolStage, ServerVersion, ServerVersionInfo};
use packettap_registry::HostIntrospection;
use packettap_reflect::{populate_defaults, ClassHandle, ClassTable, Instance, Value};
use std::sync::Arc;

/// Names the host gives its wire codec stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecNames {
    pub decoder: &'static str,
    pub encoder: &'static str,
}

impl CodecNames {
    /// Names used from connect until the configuration stage
    pub const DEFAULT: CodecNames = CodecNames {
        decoder: "decoder",
        encoder: "encoder",
    };

    /// Names used from the configuration stage on 1.20.5 and later
    pub const CONFIGURATION: CodecNames = CodecNames {
        decoder: "inbound_config",
        encoder: "outbound_config",
    };
}

/// Name of the game logic stage at the tail of every sandbox pipeline
pub const GAME_STAGE: &str = "game";

pub struct SandboxHost {
    version: ServerVersionInfo,
    classes: Arc<ClassTable>,
    packets: Vec<HostPacket>,
    codecs: CodecNames,
}

impl SandboxHost {
    pub fn new(version: ServerVersion) -> Self {
        let (classes, packets) = classes::build(version);
        tracing::debug!(
            "Sandbox host {} defines {} classes for {} packet types",
            version,
            classes.len(),
            packets.len()
        );
        Self {
            version: ServerVersionInfo {
                version,
                raw: format!("sandbox (MC: {})", version),
            },
            classes,
            packets,
            codecs: CodecNames::DEFAULT,
        }
    }

    /// Use different codec stage names, as a host with changed internals would
    pub fn with_codec_names(mut self, codecs: CodecNames) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn version(&self) -> &ServerVersionInfo {
        &self.version
    }

    pub fn classes(&self) -> &Arc<ClassTable> {
        &self.classes
    }

    pub fn codec_names(&self) -> CodecNames {
        self.codecs
    }

    pub fn packets(&self) -> &[HostPacket] {
        &self.packets
    }

    pub fn is_modern(&self) -> bool {
        self.version.version.at_least(ServerVersion::MOJANG_MAPPINGS)
    }

    pub fn has_configuration_stage(&self) -> bool {
        self.version.version.has_configuration_stage()
    }

    /// Whether codecs are renamed when the configuration stage starts
    pub fn renames_config_pipeline(&self) -> bool {
        self.version.version.at_least(ServerVersion::CONFIG_PIPELINE_RENAME)
            && self.codecs == CodecNames::DEFAULT
    }

    pub fn class_for(&self, packet: PacketType) -> Option<&ClassHandle> {
        self.packets
            .iter()
            .find(|entry| entry.packet == packet)
            .map(|entry| &entry.class)
    }

    /// Packet type `class_name` implements in a stage and direction
    pub fn packet_of(&self, stage: ProtocolStage, direction: Direction, class_name: &str) -> Option<PacketType> {
        self.packets
            .iter()
            .find(|entry| {
                entry.packet.stage() == stage
                    && entry.packet.direction() == direction
                    && entry.class.name() == class_name
            })
            .map(|entry| entry.packet)
    }

    /// Build a packet, filling its leading fields from `values`
    pub fn new_packet(&self, packet: PacketType, values: Vec<Value>) -> Result<Instance> {
        let class = self.class_for(packet).ok_or_else(|| TapError::UnsupportedPacket {
            packet: packet.to_string(),
            reason: format!("not implemented by sandbox {}", self.version.version),
        })?;

        let mut instance = Instance::new(class);
        populate_defaults(&mut instance, &self.classes, 0);
        let slots = instance.slots_mut();
        if values.len() > slots.len() {
            return Err(TapError::InvalidData(format!(
                "{} has {} fields, got {} values",
                class.name(),
                slots.len(),
                values.len()
            )));
        }
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = value;
        }
        Ok(instance)
    }
}

impl HostIntrospection for SandboxHost {
    fn class_table(&self) -> Arc<ClassTable> {
        self.classes.clone()
    }

    fn declared_class(&self, packet: &PacketType) -> Option<String> {
        if !self.is_modern() || *packet == packets::play::server::SYSTEM_CHAT {
            return None;
        }
        self.class_for(*packet).map(|class| class.name().to_string())
    }
}

impl std::fmt::Debug for SandboxHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHost")
            .field("version", &self.version.raw)
            .field("packets", &self.packets.len())
            .field("codecs", &self.codecs)
            .finish()
    }
}
