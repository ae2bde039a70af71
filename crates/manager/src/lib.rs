//! PacketTap - packet interception for a running game server
//!
//! Plugins start here: build a [`ProtocolManager`] for the host, register
//! listeners and inject connections.
//!
//! ```ignore
//! let manager = ProtocolManager::initialize(version, host, TapConfig::load_default()?)?;
//! manager.register_listener(&[packets::play::client::CHAT], ListenerOptions::new(), |event| {
//!     event.packet_mut()?.write(0, "REDACTED".to_string())?;
//!     Ok(())
//! })?;
//! manager.inject_channel(&channel)?;
//! ```

mod manager;

pub use manager::ProtocolManager;

pub use packettap_config::TapConfig;
pub use packettap_core::{AccessError, ConnectionId, ListenerId, Result, TapError};
pub use packettap_events::{ListenerHandle, ListenerOptions, ListenerPriority, PacketContainer, PacketEvent, TimingStats};
pub use packettap_injector::{ChannelInjector, InjectionState, INBOUND_STAGE, OUTBOUND_STAGE};
pub use packettap_protocol::{packets, Direction, PacketType, ProtocolStage, ServerVersion, ServerVersionInfo};
pub use packettap_registry::HostIntrospection;
