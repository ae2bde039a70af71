//! # PacketTap Injector
//!
//! Per-connection interception: splices the interception stages into a
//! channel pipeline, classifies every packet passing them, runs the
//! listeners and forwards or suppresses the result.
//!
//! ## Modules
//!
//! - [`injector`] - Install, verify and remove interception on one channel
//! - [`interceptor`] - The inbound and outbound interception stages
//! - [`factory`] - One injector per connection, lookup by player
//! - [`sniffer`] - Protocol version and player name sniffing
//! - [`state`] - Injection state machine
//! - [`context`] - Engine state shared by every injector

pub mod context;
pub mod factory;
pub mod injector;
pub mod interceptor;
pub mod sniffer;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use context::InterceptionContext;
pub use factory::InjectionFactory;
pub use injector::{find_anchor, ChannelInjector, INJECTOR_ATTR};
pub use interceptor::{INBOUND_STAGE, OUTBOUND_STAGE};
pub use sniffer::{Sniffed, PLAYER_NAME_ATTR, PROTOCOL_VERSION_ATTR};
pub use state::{AtomicInjectionState, InjectionState};
