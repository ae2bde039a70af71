//! Structural signatures
//!
//! The ordered list of a class's field types, used to validate name-based
//! matches and, as a last resort, to find a packet class by shape alone.

use packettap_protocol::{packets, PacketType};
use packettap_reflect::{AccessLevel, ClassHandle, StructureLayout, ValueType};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralSignature(Vec<ValueType>);

impl StructuralSignature {
    pub fn new(types: Vec<ValueType>) -> Self {
        Self(types)
    }

    /// Signature of `class` in layout order, stopping at `base`
    pub fn of_class(class: &ClassHandle, base: Option<&str>) -> Self {
        let layout = StructureLayout::build(class, base, AccessLevel::Privileged);
        Self(
            layout
                .accessors()
                .iter()
                .map(|accessor| accessor.value_type().clone())
                .collect(),
        )
    }

    pub fn types(&self) -> &[ValueType] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every type of `self` appears in `other`, in order
    pub fn is_subsequence_of(&self, other: &StructuralSignature) -> bool {
        let mut remaining = other.0.iter();
        self.0
            .iter()
            .all(|wanted| remaining.by_ref().any(|candidate| candidate == wanted))
    }
}

impl fmt::Display for StructuralSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, ty) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", ty)?;
        }
        f.write_str(")")
    }
}

/// Field types every known implementation of `packet` starts with, in order
///
/// Shared by all shims; a version that diverges overrides it in its shim.
pub fn minimum_signature(packet: &PacketType) -> Option<StructuralSignature> {
    use ValueType::*;

    let types = match *packet {
        p if p == packets::handshake::client::SET_PROTOCOL => vec![Int, String, Int],
        p if p == packets::login::client::START => vec![String],
        p if p == packets::play::client::CHAT => vec![String],
        p if p == packets::play::server::CHAT => vec![String],
        p if p == packets::play::server::SYSTEM_CHAT => vec![String, Bool],
        p if p == packets::play::server::SPAWN_ENTITY => vec![Int],
        p if p == packets::play::server::KICK_DISCONNECT => vec![String],
        p if p == packets::play::server::REL_ENTITY_MOVE => vec![Int, Short, Short, Short, Bool],
        p if p.name() == "KeepAlive" => vec![Long],
        _ => return None,
    };
    Some(StructuralSignature(types))
}

#[cfg(test)]
mod tests {
    use super::*;
    use packettap_reflect::ClassDef;
    use std::sync::Arc;

    #[test]
    fn test_subsequence() {
        let min = StructuralSignature::new(vec![ValueType::Int, ValueType::String]);
        let full = StructuralSignature::new(vec![ValueType::Int, ValueType::Bool, ValueType::String]);
        let reversed = StructuralSignature::new(vec![ValueType::String, ValueType::Int]);

        assert!(min.is_subsequence_of(&full));
        assert!(!min.is_subsequence_of(&reversed));
        assert!(StructuralSignature::new(vec![]).is_subsequence_of(&reversed));
    }

    #[test]
    fn test_of_class_skips_base() {
        let base = Arc::new(ClassDef::builder("Packet").field("handled", ValueType::Bool).build());
        let chat = Arc::new(
            ClassDef::builder("ChatPacket")
                .extends(&base)
                .field("message", ValueType::String)
                .build(),
        );
        let signature = StructuralSignature::of_class(&chat, Some("Packet"));
        assert_eq!(signature.types(), &[ValueType::String]);
        assert_eq!(signature.to_string(), "(String)");
    }

    #[test]
    fn test_minimum_signatures() {
        let keep_alive = minimum_signature(&packets::configuration::server::KEEP_ALIVE).unwrap();
        assert_eq!(keep_alive.types(), &[ValueType::Long]);
        assert!(minimum_signature(&packets::status::client::PING).is_none());
    }
}
