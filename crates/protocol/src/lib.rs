//! # PacketTap Protocol Library
//!
//! Version-independent vocabulary shared by every other crate:
//!
//! - [`ProtocolStage`] and [`Direction`]: where a packet can appear
//! - [`PacketType`]: logical packet identifiers, catalogued in [`packets`]
//! - [`ServerVersion`]: parsed server versions with the thresholds the
//!   compatibility layer switches on
//!
//! Nothing here knows how a packet is laid out on a particular server; that
//! is resolved at runtime by the registry.

pub mod packet_type;
pub mod packets;
pub mod stage;
pub mod version;

pub use packet_type::PacketType;
pub use stage::{Direction, ProtocolStage};
pub use version::{ServerVersion, ServerVersionInfo};
