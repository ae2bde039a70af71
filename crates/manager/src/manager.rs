//! # Protocol Manager
//!
//! The single entry point plugins use: listener registration, packet
//! creation and wrapping, synthetic packets and channel injection.
//!
//! # Lifecycle
//!
//! ```text
//! initialize(version, host, config) ──> inject_channel(..) per connection ──> shutdown_all()
//! ```
//!
//! The manager owns every cache it creates. Nothing is process global, so
//! two managers for two hosts can live side by side.

use packettap_config::TapConfig;
use packettap_core::{ConnectionId, Result, TapError};
use packettap_events::{
    Dispatcher, FaultReporter, ListenerHandle, ListenerOptions, ListenerRegistry, ListenerTimings, PacketContainer,
    PacketEvent, TimingStats,
};
use packettap_injector::{ChannelInjector, InjectionFactory, InterceptionContext};
use packettap_network::Channel;
use packettap_protocol::{Direction, PacketType, ProtocolStage, ServerVersionInfo};
use packettap_reflect::Instance;
use packettap_registry::{select_shim, HostIntrospection, PacketRegistry, StructureCache, VersionShim};
use std::sync::Arc;

/// Packet interception engine for one host
pub struct ProtocolManager {
    version: ServerVersionInfo,
    config: TapConfig,
    structures: Arc<StructureCache>,
    dispatcher: Arc<Dispatcher>,
    factory: Arc<InjectionFactory>,
}

impl ProtocolManager {
    /// Start the engine for a host
    ///
    /// # Arguments
    /// * `version` - Version the host reported
    /// * `host` - Access to the host's classes
    /// * `config` - Engine configuration
    ///
    /// # Errors
    /// `Config` when the configuration is inconsistent or the host is older
    /// than `minimum_version`
    pub fn initialize(version: ServerVersionInfo, host: Arc<dyn HostIntrospection>, config: TapConfig) -> Result<Self> {
        config.validate()?;
        if version.version < config.minimum_version {
            return Err(TapError::Config(format!(
                "server version {} is older than the minimum {}",
                version.version, config.minimum_version
            )));
        }

        let shim = select_shim(version.version);
        let registry = Arc::new(PacketRegistry::new(shim, host, config.resolution_policy()));
        let structures = Arc::new(StructureCache::new(registry));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(ListenerRegistry::new()),
            FaultReporter::new(config.max_fault_reports),
            ListenerTimings::new(config.listener_timings),
        ));
        let context = Arc::new(InterceptionContext::new(structures.clone(), dispatcher.clone()));

        tracing::info!(
            "PacketTap initialised for {} ({} shim)",
            version.raw,
            structures.registry().shim().name()
        );
        Ok(Self {
            version,
            config,
            structures,
            dispatcher,
            factory: InjectionFactory::new(context),
        })
    }

    pub fn version(&self) -> &ServerVersionInfo {
        &self.version
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    pub fn shim(&self) -> &Arc<dyn VersionShim> {
        self.registry().shim()
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        self.structures.registry()
    }

    pub fn structures(&self) -> &Arc<StructureCache> {
        &self.structures
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        self.dispatcher.listeners()
    }

    pub fn factory(&self) -> &Arc<InjectionFactory> {
        &self.factory
    }

    pub fn is_supported(&self, packet: PacketType) -> bool {
        self.registry().is_supported(packet)
    }

    // --- Listeners -------------------------------------------------------

    /// Observe every packet of the given types
    ///
    /// Packet types this server does not support are skipped with a
    /// warning; registration fails only if none is left.
    pub fn register_listener<F>(
        &self,
        packet_types: &[PacketType],
        options: ListenerOptions,
        callback: F,
    ) -> Result<ListenerHandle>
    where
        F: Fn(&mut PacketEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut supported = Vec::with_capacity(packet_types.len());
        for packet in packet_types {
            match self.registry().resolve(*packet) {
                Ok(_) => supported.push(*packet),
                Err(e) => tracing::warn!("Listener will not see {}: {}", packet, e),
            }
        }
        if supported.is_empty() && !packet_types.is_empty() {
            return Err(TapError::UnsupportedPacket {
                packet: packet_types
                    .iter()
                    .map(|packet| packet.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                reason: "no listed packet type is supported on this server".to_string(),
            });
        }
        self.listeners().register(&supported, options, callback)
    }

    pub fn unregister_listener(&self, handle: &ListenerHandle) -> bool {
        self.dispatcher.unregister(handle)
    }

    /// Per-listener timings, most expensive first
    pub fn timings(&self) -> Vec<TimingStats> {
        self.dispatcher.timings().snapshot()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    // --- Packets ---------------------------------------------------------

    /// A new packet of `packet_type` with default field values
    pub fn create_packet(&self, packet_type: PacketType) -> Result<PacketContainer> {
        let instance = self.structures.new_packet(packet_type)?;
        self.wrap_as(packet_type, instance)
    }

    /// Wrap an existing packet instance, detecting its packet type
    pub fn wrap(&self, instance: Instance) -> Result<PacketContainer> {
        let packet_type = self.packet_type_of(instance.class_name()).ok_or_else(|| TapError::UnsupportedPacket {
            packet: instance.class_name().to_string(),
            reason: "class implements no known packet type".to_string(),
        })?;
        self.wrap_as(packet_type, instance)
    }

    /// Wrap an existing packet instance as `packet_type`
    pub fn wrap_as(&self, packet_type: PacketType, instance: Instance) -> Result<PacketContainer> {
        let template = self.structures.template(packet_type)?;
        PacketContainer::new(packet_type, instance, template)
    }

    /// Packet type implemented by `class_name` in any stage and direction
    pub fn packet_type_of(&self, class_name: &str) -> Option<PacketType> {
        ProtocolStage::ALL.into_iter().find_map(|stage| {
            [Direction::Inbound, Direction::Outbound]
                .into_iter()
                .find_map(|direction| self.registry().packet_type_of(stage, direction, class_name))
        })
    }

    // --- Channels --------------------------------------------------------

    /// Start intercepting `channel`
    ///
    /// Injection itself runs on the channel task; use
    /// [`ChannelInjector::inject_and_wait`] on the result to wait for it.
    pub fn inject_channel(&self, channel: &Arc<Channel>) -> Result<Arc<ChannelInjector>> {
        let injector = self.factory.from_channel(channel)?;
        injector.inject();
        Ok(injector)
    }

    /// Stop intercepting a connection
    ///
    /// Returns `false` if the connection is not known.
    pub fn uninject_channel(&self, connection: ConnectionId) -> bool {
        match self.factory.get(connection) {
            Some(injector) => {
                injector.uninject();
                true
            }
            None => false,
        }
    }

    /// Injector of a connection, detached ones included until the
    /// connection closes
    pub fn injector(&self, connection: ConnectionId) -> Option<Arc<ChannelInjector>> {
        self.factory.get(connection)
    }

    pub fn injector_for_player(&self, name: &str) -> Option<Arc<ChannelInjector>> {
        self.factory.by_player(name)
    }

    /// Send `packet` to the client; outbound listeners see it
    pub fn send_server_packet(&self, connection: ConnectionId, packet: PacketContainer) -> Result<()> {
        self.connection(connection)?
            .send_server_packet(packet.into_handle(), true)
    }

    /// Send `packet` to the client without running outbound listeners
    pub fn send_server_packet_unfiltered(&self, connection: ConnectionId, packet: PacketContainer) -> Result<()> {
        self.connection(connection)?
            .send_server_packet(packet.into_handle(), false)
    }

    /// Deliver `packet` to the server as if the client sent it; inbound
    /// listeners see it
    pub fn receive_client_packet(&self, connection: ConnectionId, packet: PacketContainer) -> Result<()> {
        self.connection(connection)?
            .receive_client_packet(packet.into_handle(), true)
    }

    /// Deliver `packet` to the server without running inbound listeners
    pub fn receive_client_packet_unfiltered(&self, connection: ConnectionId, packet: PacketContainer) -> Result<()> {
        self.connection(connection)?
            .receive_client_packet(packet.into_handle(), false)
    }

    fn connection(&self, connection: ConnectionId) -> Result<Arc<ChannelInjector>> {
        self.factory
            .get(connection)
            .ok_or_else(|| TapError::NotFound(format!("connection {}", connection)))
    }

    /// Detach every injected connection and drop every listener
    ///
    /// # Returns
    /// Number of connections detached
    pub async fn shutdown_all(&self) -> usize {
        let detached = self.factory.close().await;
        self.listeners().clear();
        tracing::info!("PacketTap shut down");
        detached
    }
}
