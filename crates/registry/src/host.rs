//! Host introspection boundary

use packettap_protocol::PacketType;
use packettap_reflect::ClassTable;
use std::sync::Arc;

/// What the engine may learn about the host server's classes
pub trait HostIntrospection: Send + Sync {
    /// Every class the host defines
    fn class_table(&self) -> Arc<ClassTable>;

    /// Class the host itself registers for `packet`, if it exposes a
    /// packet mapping at all
    fn declared_class(&self, _packet: &PacketType) -> Option<String> {
        None
    }
}
