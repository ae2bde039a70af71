//! # Version Shims
//!
//! Everything that differs between server versions, behind one trait:
//! class naming conventions, the packet base class, pipeline anchor names
//! and the field shapes packets are expected to have.
//!
//! | Shim           | Versions | Class names                          | Anchors                          |
//! |----------------|----------|--------------------------------------|----------------------------------|
//! | [`LegacyShim`] | < 1.17   | `PacketPlayOutChat`                  | `decoder` / `encoder`            |
//! | [`ModernShim`] | >= 1.17  | `ClientboundPlayerChatPacket`        | + `inbound_config` / `outbound_config` from 1.20.5 |

use crate::signature::{minimum_signature, StructuralSignature};
use packettap_protocol::{PacketType, ServerVersion};
use std::sync::Arc;

/// Version-specific knowledge used by the registry and the injector
pub trait VersionShim: Send + Sync {
    fn version(&self) -> ServerVersion;

    /// Name of the class every packet class inherits from
    fn packet_base_class(&self) -> &str;

    /// Class names that may implement `packet`, most likely first
    fn candidate_class_names(&self, packet: &PacketType) -> Vec<String>;

    /// Pipeline stage names after which inbound interception is installed,
    /// in order of preference
    fn decoder_anchors(&self) -> &[&'static str];

    /// Pipeline stage names after which outbound interception is installed,
    /// in order of preference
    fn encoder_anchors(&self) -> &[&'static str];

    /// Minimum field shape `packet` must have on this version
    fn expected_signature(&self, packet: &PacketType) -> Option<StructuralSignature> {
        minimum_signature(packet)
    }

    fn name(&self) -> &'static str;
}

const PACKET_BASE: &str = "Packet";

/// Shim for servers before 1.17
#[derive(Debug, Clone)]
pub struct LegacyShim {
    version: ServerVersion,
}

impl LegacyShim {
    pub fn new(version: ServerVersion) -> Self {
        Self { version }
    }
}

impl VersionShim for LegacyShim {
    fn version(&self) -> ServerVersion {
        self.version
    }

    fn packet_base_class(&self) -> &str {
        PACKET_BASE
    }

    fn candidate_class_names(&self, packet: &PacketType) -> Vec<String> {
        // Legacy names are the oldest stems
        packet
            .stems()
            .iter()
            .rev()
            .map(|stem| {
                format!(
                    "Packet{}{}{}",
                    packet.stage().legacy_name(),
                    packet.direction().legacy_name(),
                    stem
                )
            })
            .collect()
    }

    fn decoder_anchors(&self) -> &[&'static str] {
        &["decoder"]
    }

    fn encoder_anchors(&self) -> &[&'static str] {
        &["encoder"]
    }

    fn name(&self) -> &'static str {
        "legacy"
    }
}

/// Shim for 1.17 and later
#[derive(Debug, Clone)]
pub struct ModernShim {
    version: ServerVersion,
}

impl ModernShim {
    pub fn new(version: ServerVersion) -> Self {
        Self { version }
    }

    fn renames_config_pipeline(&self) -> bool {
        self.version.at_least(ServerVersion::CONFIG_PIPELINE_RENAME)
    }
}

impl VersionShim for ModernShim {
    fn version(&self) -> ServerVersion {
        self.version
    }

    fn packet_base_class(&self) -> &str {
        PACKET_BASE
    }

    fn candidate_class_names(&self, packet: &PacketType) -> Vec<String> {
        let prefix = packet.direction().modern_name();
        let mut names: Vec<String> = packet
            .stems()
            .iter()
            .map(|stem| format!("{}{}Packet", prefix, stem))
            .collect();
        names.extend(packet.stems().iter().map(|stem| format!("{}Packet", stem)));
        names
    }

    fn decoder_anchors(&self) -> &[&'static str] {
        if self.renames_config_pipeline() {
            &["inbound_config", "decoder"]
        } else {
            &["decoder"]
        }
    }

    fn encoder_anchors(&self) -> &[&'static str] {
        if self.renames_config_pipeline() {
            &["outbound_config", "encoder"]
        } else {
            &["encoder"]
        }
    }

    fn name(&self) -> &'static str {
        "modern"
    }
}

/// Pick the shim for `version`
pub fn select_shim(version: ServerVersion) -> Arc<dyn VersionShim> {
    if version.at_least(ServerVersion::MOJANG_MAPPINGS) {
        tracing::debug!("Using modern version shim for {}", version);
        Arc::new(ModernShim::new(version))
    } else {
        tracing::debug!("Using legacy version shim for {}", version);
        Arc::new(LegacyShim::new(version))
    }
}
