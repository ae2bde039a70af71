//! # PacketTap Network Pipeline
//!
//! A minimal model of a per-connection network pipeline: an ordered list of
//! named stages that inbound and outbound messages traverse, driven by one
//! event-loop task per channel.
//!
//! ## Modules
//!
//! - [`channel`] - Channel handle, event loop and per-channel state
//! - [`message`] - Messages flowing through a pipeline
//! - [`pipeline`] - Ordered, named stage list
//! - [`stage`] - The stage trait and its context

pub mod channel;
pub mod message;
pub mod pipeline;
pub mod stage;

pub use channel::{Channel, CloseHook, HookId, StageHook};
pub use message::{Message, PacketEnvelope};
pub use pipeline::{NamedStage, Pipeline};
pub use stage::{Flow, Stage, StageContext};
