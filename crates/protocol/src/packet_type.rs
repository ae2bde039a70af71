//! # Packet Type Identifiers
//!
//! A [`PacketType`] names one logical packet ("chat message", "entity move")
//! independently of the class that implements it on a given server version.
//!
//! ## Identity
//!
//! Two packet types are equal when stage, direction and logical name agree.
//! The list of class-name stems is resolution metadata only: it records the
//! names the packet has carried across versions, newest first, and is handed
//! to the version shim to build concrete class-name candidates.

use crate::stage::{Direction, ProtocolStage};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Logical packet identifier
#[derive(Clone, Copy)]
pub struct PacketType {
    stage: ProtocolStage,
    direction: Direction,
    name: &'static str,
    stems: &'static [&'static str],
}

impl PacketType {
    /// Create a packet type
    ///
    /// # Arguments
    /// * `stage` - Protocol stage the packet is valid in
    /// * `direction` - Inbound (serverbound) or outbound (clientbound)
    /// * `name` - Stable logical name
    /// * `stems` - Class-name stems used across versions, newest first
    pub const fn new(
        stage: ProtocolStage,
        direction: Direction,
        name: &'static str,
        stems: &'static [&'static str],
    ) -> Self {
        Self {
            stage,
            direction,
            name,
            stems,
        }
    }

    #[inline]
    pub fn stage(&self) -> ProtocolStage {
        self.stage
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Class-name stems, newest first
    #[inline]
    pub fn stems(&self) -> &'static [&'static str] {
        self.stems
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }
}

impl PartialEq for PacketType {
    fn eq(&self, other: &Self) -> bool {
        self.stage == other.stage && self.direction == other.direction && self.name == other.name
    }
}

impl Eq for PacketType {}

impl Hash for PacketType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stage.hash(state);
        self.direction.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.stage, self.direction, self.name)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {}]", self.name, self.stage, self.direction)
    }
}
