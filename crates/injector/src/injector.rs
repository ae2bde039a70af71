//! # Channel Injector
//!
//! Splices the interception stages into one channel pipeline and runs the
//! listeners for every packet passing them.
//!
//! # Architecture
//!
//! ```text
//!  decoder ─ packettap_inbound ─ encoder ─ packettap_outbound ─ game
//!                 │                               │
//!                 └────────── ChannelInjector ────┘
//!                                   │
//!                  registry (classify) ─ dispatcher (listeners)
//! ```
//!
//! Install, uninstall and synthetic packets all go through the channel's
//! task queue, so they are ordered with the connection's own traffic.
//!
//! # Failure
//!
//! When the pipeline does not have the expected anchors, or the host
//! rejects an insertion, the partial insertion is undone, the failure is
//! logged once and the injector detaches. The connection keeps working
//! without interception.

use crate::context::InterceptionContext;
use crate::factory::InjectionFactory;
use crate::interceptor::{InboundInterceptor, OutboundInterceptor, INBOUND_STAGE, OUTBOUND_STAGE};
use crate::sniffer::{self, Sniffed, PLAYER_NAME_ATTR, PROTOCOL_VERSION_ATTR};
use crate::state::{AtomicInjectionState, InjectionState};
use packettap_core::{ConnectionId, Result, TapError};
use packettap_events::{PacketContainer, PacketEvent};
use packettap_network::{Channel, Flow, HookId, Message, PacketEnvelope, Pipeline, Stage};
use packettap_protocol::{Direction, PacketType, ProtocolStage};
use packettap_reflect::Instance;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};

/// Channel attribute present while a channel is injected
pub const INJECTOR_ATTR: &str = "packettap_injector";

const UNKNOWN_VERSION: i32 = -1;

struct InjectorMarker(Weak<ChannelInjector>);

/// Interception state of one connection
pub struct ChannelInjector {
    channel: Arc<Channel>,
    context: Arc<InterceptionContext>,
    factory: Weak<InjectionFactory>,
    state: AtomicInjectionState,
    failure_logged: AtomicBool,
    failure: Mutex<Option<String>>,
    stage_hook: Mutex<Option<HookId>>,
    close_hook: Mutex<Option<HookId>>,
    protocol_version: AtomicI32,
    player: RwLock<Option<String>>,
}

impl ChannelInjector {
    /// Injector not tracked by any factory
    pub fn new(channel: Arc<Channel>, context: Arc<InterceptionContext>) -> Arc<Self> {
        Self::with_factory(channel, context, Weak::new())
    }

    pub(crate) fn with_factory(
        channel: Arc<Channel>,
        context: Arc<InterceptionContext>,
        factory: Weak<InjectionFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel,
            context,
            factory,
            state: AtomicInjectionState::new(),
            failure_logged: AtomicBool::new(false),
            failure: Mutex::new(None),
            stage_hook: Mutex::new(None),
            close_hook: Mutex::new(None),
            protocol_version: AtomicI32::new(UNKNOWN_VERSION),
            player: RwLock::new(None),
        })
    }

    /// Injector currently attached to `channel`
    pub fn of(channel: &Channel) -> Option<Arc<ChannelInjector>> {
        channel.attribute::<InjectorMarker>(INJECTOR_ATTR)?.0.upgrade()
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.channel.id()
    }

    pub fn state(&self) -> InjectionState {
        self.state.load()
    }

    pub fn is_injected(&self) -> bool {
        self.state() == InjectionState::Injected
    }

    /// Why injection failed, if it did
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Protocol version the client announced in its handshake
    pub fn protocol_version(&self) -> Option<i32> {
        match self.protocol_version.load(Ordering::Acquire) {
            UNKNOWN_VERSION => None,
            version => Some(version),
        }
    }

    /// Player name sent at login start
    pub fn player(&self) -> Option<String> {
        self.player.read().clone()
    }

    // --- Install / uninstall ---------------------------------------------

    /// Splice the interception stages into the pipeline
    ///
    /// Runs on the channel task; called from anywhere else, the work is
    /// queued behind everything already submitted to the channel. Does
    /// nothing for closed channels.
    pub fn inject(self: &Arc<Self>) {
        if self.channel.is_closed() {
            return;
        }
        if self.channel.in_event_loop() {
            self.inject_now();
            return;
        }
        let injector = self.clone();
        if let Err(e) = self.channel.execute(move |_| {
            injector.inject_now();
        }) {
            tracing::debug!("Channel {} closed before injection: {}", self.connection_id(), e);
        }
    }

    /// Same as [`inject`](Self::inject), waiting for the outcome
    ///
    /// # Returns
    /// `true` if the channel is injected afterwards
    pub async fn inject_and_wait(self: &Arc<Self>) -> bool {
        if self.channel.is_closed() {
            return false;
        }
        let injector = self.clone();
        self.channel
            .submit(move |_| injector.inject_now())
            .await
            .unwrap_or(false)
    }

    /// Remove the interception stages; the injector is detached afterwards
    pub fn uninject(self: &Arc<Self>) {
        if self.channel.in_event_loop() || self.channel.is_closed() {
            self.detach_now("uninjected");
            return;
        }
        let injector = self.clone();
        if self
            .channel
            .execute(move |_| {
                injector.detach_now("uninjected");
            })
            .is_err()
        {
            self.detach_now("uninjected");
        }
    }

    /// Same as [`uninject`](Self::uninject), waiting until the stages are gone
    ///
    /// # Returns
    /// `true` if this call detached an injected channel
    pub async fn uninject_and_wait(self: &Arc<Self>) -> bool {
        if !self.channel.is_closed() {
            let injector = self.clone();
            if let Ok(detached) = self.channel.submit(move |_| injector.detach_now("uninjected")).await {
                return detached;
            }
        }
        self.detach_now("uninjected")
    }

    fn inject_now(self: &Arc<Self>) -> bool {
        if self.channel.is_closed() {
            return false;
        }
        match self.state() {
            InjectionState::Injected => return true,
            InjectionState::Detached => return false,
            InjectionState::Uninjected => {}
        }

        if let Err(e) = self.install() {
            self.fail(e);
            return false;
        }
        if self
            .state
            .transition(InjectionState::Uninjected, InjectionState::Injected)
            .is_err()
        {
            self.remove_stages();
            return false;
        }

        self.channel
            .set_attribute(INJECTOR_ATTR, InjectorMarker(Arc::downgrade(self)));

        let weak = Arc::downgrade(self);
        let hook = self.channel.on_stage_change(Arc::new(move |_, old, new| {
            if let Some(injector) = weak.upgrade() {
                injector.on_stage_change(old, new);
            }
        }));
        *self.stage_hook.lock() = Some(hook);

        let weak = Arc::downgrade(self);
        let hook = self.channel.on_close(Box::new(move |_| {
            if let Some(injector) = weak.upgrade() {
                injector.detach_now("channel closed");
            }
        }));
        *self.close_hook.lock() = Some(hook);

        tracing::debug!(
            "Injected channel {} ({} shim)",
            self.connection_id(),
            self.context.shim().name()
        );
        true
    }

    /// Insert both stages, undoing the first if the second fails
    fn install(self: &Arc<Self>) -> Result<()> {
        let pipeline = self.channel.pipeline();
        if pipeline.contains(INBOUND_STAGE) || pipeline.contains(OUTBOUND_STAGE) {
            return Err(self.failure_error("pipeline already carries interception stages"));
        }

        let shim = self.context.shim();
        let decoder = self.anchor(shim.decoder_anchors(), "decoder")?;
        let encoder = self.anchor(shim.encoder_anchors(), "encoder")?;

        pipeline
            .add_after(decoder, INBOUND_STAGE, self.inbound_stage())
            .map_err(|e| self.failure_error(e.to_string()))?;
        if let Err(e) = pipeline.add_after(encoder, OUTBOUND_STAGE, self.outbound_stage()) {
            pipeline.remove(INBOUND_STAGE);
            return Err(self.failure_error(e.to_string()));
        }
        Ok(())
    }

    fn on_stage_change(self: &Arc<Self>, old: ProtocolStage, new: ProtocolStage) {
        if !self.is_injected() {
            return;
        }
        tracing::trace!("Channel {} {} -> {}, verifying stages", self.connection_id(), old, new);
        if let Err(e) = self.verify() {
            self.release();
            self.fail(e);
        }
    }

    /// Put the interception stages back right after their anchors if the
    /// host rebuilt, renamed or reordered its stages
    fn verify(self: &Arc<Self>) -> Result<()> {
        let shim = self.context.shim();
        let decoder = self.anchor(shim.decoder_anchors(), "decoder")?;
        self.ensure_after(decoder, INBOUND_STAGE, || self.inbound_stage())?;
        let encoder = self.anchor(shim.encoder_anchors(), "encoder")?;
        self.ensure_after(encoder, OUTBOUND_STAGE, || self.outbound_stage())
    }

    fn ensure_after<F>(&self, anchor: &str, name: &str, make: F) -> Result<()>
    where
        F: FnOnce() -> Arc<dyn Stage>,
    {
        let pipeline = self.channel.pipeline();
        if let (Some(anchor_at), Some(stage_at)) = (pipeline.position(anchor), pipeline.position(name)) {
            if stage_at == anchor_at + 1 {
                return Ok(());
            }
        }

        let stage = pipeline.remove(name).unwrap_or_else(make);
        pipeline
            .add_after(anchor, name, stage)
            .map_err(|e| self.failure_error(e.to_string()))?;
        tracing::debug!("Channel {}: moved {} after {}", self.connection_id(), name, anchor);
        Ok(())
    }

    /// Move to `DETACHED` and clean the channel up
    ///
    /// # Returns
    /// `true` if the channel was injected before
    fn detach_now(&self, reason: &str) -> bool {
        if self.state.detach() != InjectionState::Injected {
            return false;
        }
        self.release();
        tracing::debug!("Detached channel {} ({})", self.connection_id(), reason);
        true
    }

    /// Remove everything this injector added to the channel
    fn release(&self) {
        self.remove_stages();
        self.channel.remove_attribute(INJECTOR_ATTR);
        if let Some(hook) = self.stage_hook.lock().take() {
            self.channel.remove_stage_hook(hook);
        }
        if let Some(hook) = self.close_hook.lock().take() {
            self.channel.remove_close_hook(hook);
        }
    }

    fn remove_stages(&self) {
        let pipeline = self.channel.pipeline();
        pipeline.remove(INBOUND_STAGE);
        pipeline.remove(OUTBOUND_STAGE);
    }

    fn fail(&self, error: TapError) {
        self.state.detach();
        *self.failure.lock() = Some(error.to_string());
        if !self.failure_logged.swap(true, Ordering::AcqRel) {
            tracing::warn!("{}; interception disabled for this connection", error);
        }
    }

    fn anchor(&self, anchors: &[&'static str], what: &str) -> Result<&'static str> {
        find_anchor(self.channel.pipeline(), anchors)
            .ok_or_else(|| self.failure_error(format!("no {} stage among [{}]", what, anchors.join(", "))))
    }

    fn failure_error(&self, reason: impl Into<String>) -> TapError {
        TapError::InjectionFailure {
            connection: self.connection_id().get(),
            reason: reason.into(),
        }
    }

    fn inbound_stage(self: &Arc<Self>) -> Arc<dyn Stage> {
        Arc::new(InboundInterceptor {
            injector: Arc::downgrade(self),
        })
    }

    fn outbound_stage(self: &Arc<Self>) -> Arc<dyn Stage> {
        Arc::new(OutboundInterceptor {
            injector: Arc::downgrade(self),
        })
    }

    // --- Interception ----------------------------------------------------

    /// Run the listeners for one packet passing an interception stage
    pub(crate) fn intercept(self: &Arc<Self>, direction: Direction, envelope: PacketEnvelope) -> Flow {
        if !envelope.intercept || !self.is_injected() {
            return Flow::Continue(Message::Packet(envelope));
        }

        let stage = self.channel.protocol_stage();
        let class_name = envelope.packet.class_name();
        let Some(packet_type) = self.context.registry().packet_type_of(stage, direction, class_name) else {
            tracing::trace!(
                "Channel {}: {} is not a known {} {} packet",
                self.connection_id(),
                class_name,
                stage,
                direction.as_str()
            );
            return Flow::Continue(Message::Packet(envelope));
        };

        if direction == Direction::Inbound {
            self.sniff(packet_type, &envelope.packet);
        }

        let dispatcher = self.context.dispatcher();
        if !dispatcher.has_listeners(packet_type) {
            return Flow::Continue(Message::Packet(envelope));
        }

        let template = match self.context.structures().template(packet_type) {
            Ok(template) => template,
            Err(e) => {
                tracing::debug!("Channel {}: cannot wrap {}: {}", self.connection_id(), packet_type, e);
                return Flow::Continue(Message::Packet(envelope));
            }
        };
        let container = match PacketContainer::try_wrap(packet_type, envelope.packet, template) {
            Ok(container) => container,
            Err(packet) => return Flow::Continue(Message::packet(packet)),
        };

        let mut event = PacketEvent::new(container, Some(self.connection_id())).with_player(self.player());
        dispatcher.dispatch(&mut event);

        if event.is_cancelled() {
            tracing::trace!("Channel {}: {} cancelled", self.connection_id(), packet_type);
            return Flow::Stop;
        }
        Flow::Continue(Message::packet(event.into_packet().into_handle()))
    }

    fn sniff(self: &Arc<Self>, packet_type: PacketType, packet: &Instance) {
        match sniffer::sniff(self.context.structures(), packet_type, packet) {
            Some(Sniffed::ProtocolVersion(version)) => {
                self.protocol_version.store(version, Ordering::Release);
                self.channel.set_attribute(PROTOCOL_VERSION_ATTR, version);
                tracing::debug!("Channel {} uses protocol version {}", self.connection_id(), version);
            }
            Some(Sniffed::PlayerName(name)) => {
                *self.player.write() = Some(name.clone());
                self.channel.set_attribute(PLAYER_NAME_ATTR, name.clone());
                if let Some(factory) = self.factory.upgrade() {
                    factory.register_player(&name, self);
                }
                tracing::debug!("Channel {} belongs to {}", self.connection_id(), name);
            }
            None => {}
        }
    }

    // --- Synthetic packets -----------------------------------------------

    /// Queue `packet` for the client as if the server had written it
    ///
    /// With `intercept` false the outbound listeners do not see it.
    pub fn send_server_packet(&self, packet: Instance, intercept: bool) -> Result<()> {
        self.channel.write(envelope(packet, intercept))
    }

    /// Queue `packet` as if the client had sent it
    ///
    /// The packet enters right after the decoder, so it is not decoded again
    /// and passes the inbound interceptor. With `intercept` false the inbound
    /// listeners do not see it.
    pub fn receive_client_packet(&self, packet: Instance, intercept: bool) -> Result<()> {
        let message = envelope(packet, intercept);
        match find_anchor(self.channel.pipeline(), self.context.shim().decoder_anchors()) {
            Some(decoder) => self.channel.fire_inbound_after(decoder, message),
            None => self.channel.fire_inbound(message),
        }
    }
}

fn envelope(packet: Instance, intercept: bool) -> Message {
    if intercept {
        Message::packet(packet)
    } else {
        Message::unfiltered(packet)
    }
}

/// First of `anchors` present in `pipeline`
pub fn find_anchor(pipeline: &Pipeline, anchors: &[&'static str]) -> Option<&'static str> {
    anchors.iter().copied().find(|anchor| pipeline.contains(anchor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flush, Harness};
    use packettap_events::ListenerOptions;
    use packettap_protocol::{packets, ServerVersion};

    #[tokio::test]
    async fn test_inject_places_stages() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        let (channel, _out, _game) = harness.open_channel(1, true);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());

        assert!(injector.inject_and_wait().await);
        assert_eq!(
            channel.pipeline().names(),
            vec!["decoder", INBOUND_STAGE, "encoder", OUTBOUND_STAGE, "game"]
        );
        assert!(injector.is_injected());
        assert!(ChannelInjector::of(&channel).is_some());

        // Second inject is a no-op
        assert!(injector.inject_and_wait().await);
        assert_eq!(channel.pipeline().len(), 5);

        assert!(injector.uninject_and_wait().await);
        assert_eq!(channel.pipeline().names(), vec!["decoder", "encoder", "game"]);
        assert_eq!(injector.state(), InjectionState::Detached);
        assert!(ChannelInjector::of(&channel).is_none());
        assert!(!injector.inject_and_wait().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inbound_rewrite_and_unfiltered() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        harness
            .listeners
            .register(&[packets::play::client::CHAT], ListenerOptions::new().priority(5), |event| {
                event.packet_mut()?.write(0, "REDACTED".to_string())?;
                Ok(())
            })
            .unwrap();

        let (channel, _out, game) = harness.open_channel(2, true);
        channel.set_protocol_stage(ProtocolStage::Play);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());
        assert!(injector.inject_and_wait().await);

        injector.receive_client_packet(harness.chat_in("hello"), true).unwrap();
        injector.receive_client_packet(harness.chat_in("hello"), false).unwrap();
        flush(&channel).await;

        let seen: Vec<String> = game.lock().iter().map(|p| harness.first_string(p)).collect();
        assert_eq!(seen, vec!["REDACTED", "hello"]);
    }

    #[tokio::test]
    async fn test_outbound_cancel() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        harness
            .listeners
            .register(&[packets::play::server::CHAT], ListenerOptions::new(), |event| {
                if event.packet().read::<String>(0)? == "secret" {
                    event.cancel()?;
                }
                Ok(())
            })
            .unwrap();

        let (channel, mut out, _game) = harness.open_channel(3, true);
        channel.set_protocol_stage(ProtocolStage::Play);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());
        assert!(injector.inject_and_wait().await);

        injector.send_server_packet(harness.chat_out("secret"), true).unwrap();
        injector.send_server_packet(harness.chat_out("public"), true).unwrap();
        injector.send_server_packet(harness.chat_out("secret"), false).unwrap();

        let first = out.recv().await.unwrap().into_packet().unwrap();
        let second = out.recv().await.unwrap().into_packet().unwrap();
        assert_eq!(harness.first_string(&first), "public");
        assert_eq!(harness.first_string(&second), "secret");
    }

    #[tokio::test]
    async fn test_injection_failure_leaves_traffic_alone() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        harness
            .listeners
            .register(&[packets::play::client::CHAT], ListenerOptions::new(), |event| {
                event.packet_mut()?.write(0, "changed".to_string())?;
                Ok(())
            })
            .unwrap();

        let (channel, _out, game) = harness.open_channel(4, false);
        channel.set_protocol_stage(ProtocolStage::Play);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());

        assert!(!injector.inject_and_wait().await);
        assert_eq!(injector.state(), InjectionState::Detached);
        assert!(injector.failure().unwrap().contains("no decoder stage"));
        assert_eq!(channel.pipeline().names(), vec!["game"]);

        injector.receive_client_packet(harness.chat_in("hello"), true).unwrap();
        flush(&channel).await;
        assert_eq!(harness.first_string(&game.lock()[0]), "hello");
    }

    #[tokio::test]
    async fn test_stage_change_reinserts_after_rebuild() {
        let harness = Harness::new(ServerVersion::new(1, 20, 6));
        let (channel, _out, _game) = harness.open_channel(5, true);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());
        assert!(injector.inject_and_wait().await);

        let names = channel
            .submit(|channel| {
                let pipeline = channel.pipeline();
                let decoder = pipeline.remove("decoder").unwrap();
                let encoder = pipeline.remove("encoder").unwrap();
                pipeline.add_before("game", "inbound_config", decoder).unwrap();
                pipeline.add_before("game", "outbound_config", encoder).unwrap();
                channel.set_protocol_stage(ProtocolStage::Configuration);
                pipeline.names()
            })
            .await
            .unwrap();

        assert_eq!(
            names,
            vec!["inbound_config", INBOUND_STAGE, "outbound_config", OUTBOUND_STAGE, "game"]
        );
        assert!(injector.is_injected());
    }

    #[tokio::test]
    async fn test_stage_change_without_anchor_detaches() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        let (channel, _out, _game) = harness.open_channel(6, true);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());
        assert!(injector.inject_and_wait().await);

        channel
            .submit(|channel| {
                channel.pipeline().remove("decoder");
                channel.set_protocol_stage(ProtocolStage::Login);
            })
            .await
            .unwrap();

        assert_eq!(injector.state(), InjectionState::Detached);
        assert!(!channel.pipeline().contains(INBOUND_STAGE));
        assert!(!channel.pipeline().contains(OUTBOUND_STAGE));
    }

    #[tokio::test]
    async fn test_sniffers() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        let (channel, _out, _game) = harness.open_channel(7, true);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());
        assert!(injector.inject_and_wait().await);

        injector.receive_client_packet(harness.handshake(765), true).unwrap();
        flush(&channel).await;
        channel.set_protocol_stage(ProtocolStage::Login);
        injector.receive_client_packet(harness.login_start("Notch"), true).unwrap();
        flush(&channel).await;

        assert_eq!(injector.protocol_version(), Some(765));
        assert_eq!(injector.player().as_deref(), Some("Notch"));
        assert_eq!(*channel.attribute::<i32>(PROTOCOL_VERSION_ATTR).unwrap(), 765);
    }

    #[tokio::test]
    async fn test_close_detaches() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        let (channel, _out, _game) = harness.open_channel(8, true);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());
        assert!(injector.inject_and_wait().await);

        channel.close();
        channel.wait_closed().await;

        assert_eq!(injector.state(), InjectionState::Detached);
        assert!(!channel.pipeline().contains(INBOUND_STAGE));
        assert!(!injector.inject_and_wait().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_order_preserved_per_connection() {
        let harness = Harness::new(ServerVersion::new(1, 20, 4));
        harness
            .listeners
            .register(&[packets::play::client::CHAT], ListenerOptions::new(), |event| {
                let text = event.packet().read::<String>(0)?;
                event.packet_mut()?.write(0, format!("{}!", text))?;
                Ok(())
            })
            .unwrap();

        let (channel, _out, game) = harness.open_channel(9, true);
        channel.set_protocol_stage(ProtocolStage::Play);
        let injector = ChannelInjector::new(channel.clone(), harness.context.clone());
        assert!(injector.inject_and_wait().await);

        for i in 0..200 {
            injector.receive_client_packet(harness.chat_in(&i.to_string()), true).unwrap();
        }
        flush(&channel).await;

        let seen: Vec<String> = game.lock().iter().map(|p| harness.first_string(p)).collect();
        let expected: Vec<String> = (0..200).map(|i| format!("{}!", i)).collect();
        assert_eq!(seen, expected);
    }
}
