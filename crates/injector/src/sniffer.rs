//! Built-in sniffers
//!
//! Independent of plugin listeners, the inbound interceptor picks two facts
//! out of the login sequence: the client protocol version from the handshake
//! and the player name from login start.

use packettap_protocol::{packets, PacketType};
use packettap_reflect::{Instance, Primitive};
use packettap_registry::StructureCache;

/// Channel attribute holding the client protocol version (`i32`)
pub const PROTOCOL_VERSION_ATTR: &str = "packettap_protocol_version";

/// Channel attribute holding the player name (`String`)
pub const PLAYER_NAME_ATTR: &str = "packettap_player_name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sniffed {
    ProtocolVersion(i32),
    PlayerName(String),
}

/// Extract a sniffed fact from an inbound packet, if it carries one
pub fn sniff(structures: &StructureCache, packet_type: PacketType, packet: &Instance) -> Option<Sniffed> {
    if packet_type == packets::handshake::client::SET_PROTOCOL {
        read_first::<i32>(structures, packet_type, packet).map(Sniffed::ProtocolVersion)
    } else if packet_type == packets::login::client::START {
        read_first::<String>(structures, packet_type, packet).map(Sniffed::PlayerName)
    } else {
        None
    }
}

fn read_first<T: Primitive>(structures: &StructureCache, packet_type: PacketType, packet: &Instance) -> Option<T> {
    let template = structures.template(packet_type).ok()?;
    let typed = template.with_filter(T::value_type());
    let accessor = typed.fields().first()?;
    T::from_value(accessor.get_ref(packet).ok()?)
}
