//! # PacketTap Events
//!
//! Listener registration and dispatch for intercepted packets.
//!
//! ## Modules
//!
//! - [`container`] - Packet instance plus packet type and field template
//! - [`event`] - Interception events and listener priorities
//! - [`listener`] - Listener options and the sorted listener registry
//! - [`dispatcher`] - Priority-ordered, fault-isolated dispatch
//! - [`faults`] - Rate-limited fault reporting
//! - [`timings`] - Optional per-listener timings

pub mod container;
pub mod dispatcher;
pub mod event;
pub mod faults;
pub mod listener;
pub mod timings;

#[cfg(test)]
pub(crate) mod testing;

pub use container::PacketContainer;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use event::{ListenerPriority, PacketEvent};
pub use faults::FaultReporter;
pub use listener::{Listener, ListenerCallback, ListenerHandle, ListenerOptions, ListenerRegistry};
pub use timings::{ListenerTimings, TimingStats};
