//! Pipeline stage trait

use crate::channel::Channel;
use crate::message::Message;
use std::sync::Arc;

/// Outcome of one stage handling one message
#[derive(Debug)]
pub enum Flow {
    /// Pass the (possibly replaced) message to the next stage
    Continue(Message),
    /// The message was consumed or suppressed
    Stop,
}

/// One processing step between the transport and the game logic
///
/// # Purpose
/// Stages are called from the owning channel's task only, so for one
/// connection they never run concurrently. The same stage object may be
/// shared by several channels.
///
/// Inbound messages flow head to tail, outbound messages tail to head.
/// Both methods pass the message on unchanged by default.
pub trait Stage: Send + Sync {
    fn handle_inbound(&self, _ctx: &StageContext<'_>, message: Message) -> Flow {
        Flow::Continue(message)
    }

    fn handle_outbound(&self, _ctx: &StageContext<'_>, message: Message) -> Flow {
        Flow::Continue(message)
    }
}

/// Where a stage is being called from
pub struct StageContext<'a> {
    channel: &'a Arc<Channel>,
    name: &'a str,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(channel: &'a Arc<Channel>, name: &'a str) -> Self {
        Self { channel, name }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        self.channel
    }

    /// Name this stage is registered under
    pub fn name(&self) -> &str {
        self.name
    }

    /// Queue an outbound message starting at the tail of the pipeline
    pub fn write(&self, message: Message) {
        if let Err(e) = self.channel.write(message) {
            tracing::debug!("Stage {} dropped a write: {}", self.name, e);
        }
    }

    /// Queue an inbound message that continues after this stage
    pub fn fire_inbound(&self, message: Message) {
        if let Err(e) = self.channel.fire_inbound_after(self.name, message) {
            tracing::debug!("Stage {} dropped an inbound message: {}", self.name, e);
        }
    }
}
