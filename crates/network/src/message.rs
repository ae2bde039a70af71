//! Messages travelling through a channel pipeline

use bytes::Bytes;
use packettap_reflect::Instance;

/// Anything a pipeline stage can receive
///
/// Raw bytes travel between the transport and the codec stages, decoded
/// packet objects between the codecs and the game logic.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Wire(Bytes),
    Packet(PacketEnvelope),
}

/// A decoded packet plus delivery flags
#[derive(Debug, Clone, PartialEq)]
pub struct PacketEnvelope {
    pub packet: Instance,
    /// Whether interception stages should run listeners for this packet
    pub intercept: bool,
}

impl Message {
    /// A packet that interception stages will observe
    pub fn packet(packet: Instance) -> Self {
        Self::Packet(PacketEnvelope {
            packet,
            intercept: true,
        })
    }

    /// A packet that interception stages pass through untouched
    pub fn unfiltered(packet: Instance) -> Self {
        Self::Packet(PacketEnvelope {
            packet,
            intercept: false,
        })
    }

    pub fn wire(bytes: impl Into<Bytes>) -> Self {
        Self::Wire(bytes.into())
    }

    pub fn as_packet(&self) -> Option<&Instance> {
        match self {
            Self::Packet(envelope) => Some(&envelope.packet),
            Self::Wire(_) => None,
        }
    }

    pub fn into_packet(self) -> Option<Instance> {
        match self {
            Self::Packet(envelope) => Some(envelope.packet),
            Self::Wire(_) => None,
        }
    }
}
