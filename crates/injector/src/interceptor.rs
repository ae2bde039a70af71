//! Interception stages spliced into a channel pipeline

use crate::injector::ChannelInjector;
use packettap_network::{Flow, Message, Stage, StageContext};
use packettap_protocol::Direction;
use std::sync::Weak;

/// Name of the inbound interception stage
pub const INBOUND_STAGE: &str = "packettap_inbound";

/// Name of the outbound interception stage
pub const OUTBOUND_STAGE: &str = "packettap_outbound";

/// Sits right after the decoder; sees decoded inbound packets
pub(crate) struct InboundInterceptor {
    pub(crate) injector: Weak<ChannelInjector>,
}

impl Stage for InboundInterceptor {
    fn handle_inbound(&self, _ctx: &StageContext<'_>, message: Message) -> Flow {
        match (self.injector.upgrade(), message) {
            (Some(injector), Message::Packet(envelope)) => injector.intercept(Direction::Inbound, envelope),
            (_, message) => Flow::Continue(message),
        }
    }
}

/// Sits right after the encoder; sees outbound packets before encoding
pub(crate) struct OutboundInterceptor {
    pub(crate) injector: Weak<ChannelInjector>,
}

impl Stage for OutboundInterceptor {
    fn handle_outbound(&self, _ctx: &StageContext<'_>, message: Message) -> Flow {
        match (self.injector.upgrade(), message) {
            (Some(injector), Message::Packet(envelope)) => injector.intercept(Direction::Outbound, envelope),
            (_, message) => Flow::Continue(message),
        }
    }
}
