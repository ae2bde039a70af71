//! # Sandbox Game Logic
//!
//! The tail stage of every sandbox pipeline. It records each packet that
//! reaches it and plays the server's side of the protocol:
//!
//! ```text
//! SetProtocol(next=1) ──> status: Start -> ServerInfo, Ping -> Pong, close
//! SetProtocol(next=2) ──> login: Start -> Success
//!     legacy:            ──> play: Login
//!     configuration:     LoginAck ──> configuration: FinishConfiguration
//!                        FinishConfiguration ──> play: Login
//! play: Chat -> SystemChat echo (legacy: Chat echo)
//! ```
//!
//! Stage switches that follow an outbound packet are queued behind it, so
//! the packet is still intercepted and encoded in the stage it belongs to.

use crate::codec::{JsonDecoder, JsonEncoder};
use crate::host::{CodecNames, SandboxHost, GAME_STAGE};
use packettap_core::{ConnectionId, Result, TapError};
use packettap_network::{Channel, Flow, Message, Pipeline, Stage, StageContext};
use packettap_protocol::{packets, Direction, PacketType, ProtocolStage};
use packettap_reflect::{Instance, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Channel attribute holding the player name given at login
pub const PLAYER_ATTR: &str = "sandbox_player";

/// A packet that reached the game logic
#[derive(Debug, Clone)]
pub struct Delivered {
    pub connection: ConnectionId,
    pub stage: ProtocolStage,
    pub packet_type: Option<PacketType>,
    pub packet: Instance,
}

impl Delivered {
    /// First string field, if the packet has one
    pub fn text(&self) -> Option<&str> {
        first_string(&self.packet)
    }
}

/// Everything the game logic received, in arrival order
pub struct PacketLog {
    entries: Mutex<Vec<Delivered>>,
    count: watch::Sender<usize>,
}

impl PacketLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            count: watch::channel(0).0,
        }
    }

    pub fn record(&self, delivered: Delivered) {
        let len = {
            let mut entries = self.entries.lock();
            entries.push(delivered);
            entries.len()
        };
        self.count.send_replace(len);
    }

    pub fn entries(&self) -> Vec<Delivered> {
        self.entries.lock().clone()
    }

    /// Packets of one packet type delivered on one connection
    pub fn of(&self, connection: ConnectionId, packet: PacketType) -> Vec<Delivered> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.connection == connection && entry.packet_type == Some(packet))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` packets have been recorded
    pub async fn wait_for(&self, count: usize) {
        let mut changes = self.count.subscribe();
        let _ = changes.wait_for(|len| *len >= count).await;
    }
}

impl Default for PacketLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the initial pipeline of a sandbox connection
///
/// ```text
/// [decoder] -> [encoder] -> [game]
/// ```
pub fn build_pipeline(host: &Arc<SandboxHost>, log: &Arc<PacketLog>) -> Result<Pipeline> {
    let codecs = host.codec_names();
    let pipeline = Pipeline::new();
    pipeline.add_last(codecs.decoder, Arc::new(JsonDecoder::new(host.clone())))?;
    pipeline.add_last(codecs.encoder, Arc::new(JsonEncoder::new(host.clone())))?;
    pipeline.add_last(GAME_STAGE, Arc::new(GameHandler::new(host.clone(), log.clone())))?;
    Ok(pipeline)
}

pub struct GameHandler {
    host: Arc<SandboxHost>,
    log: Arc<PacketLog>,
}

impl GameHandler {
    pub fn new(host: Arc<SandboxHost>, log: Arc<PacketLog>) -> Self {
        Self { host, log }
    }

    fn respond(&self, channel: &Arc<Channel>, packet_type: PacketType, packet: &Instance) -> Result<()> {
        match packet_type {
            p if p == packets::handshake::client::SET_PROTOCOL => match int_at(packet, 3) {
                Some(1) => channel.set_protocol_stage(ProtocolStage::Status),
                Some(2) => channel.set_protocol_stage(ProtocolStage::Login),
                other => {
                    tracing::debug!("Connection {} asked for next state {:?}", channel.id(), other);
                    channel.close();
                }
            },

            p if p == packets::status::client::START => {
                let status = serde_json::json!({
                    "version": self.host.version().raw,
                    "protocol": self.host.version().version.to_string(),
                });
                self.send(channel, packets::status::server::SERVER_INFO, vec![Value::string(status.to_string())])?;
            }
            p if p == packets::status::client::PING => {
                let time = packet.slots().first().cloned().unwrap_or(Value::Long(0));
                self.send(channel, packets::status::server::PONG, vec![time])?;
                channel.close();
            }

            p if p == packets::login::client::START => {
                let name = first_string(packet).unwrap_or("player").to_string();
                channel.set_attribute(PLAYER_ATTR, name.clone());
                let uuid = format!("00000000-0000-0000-0000-{:012x}", channel.id().get());
                self.send(
                    channel,
                    packets::login::server::SUCCESS,
                    vec![Value::string(uuid), Value::string(name)],
                )?;
                if !self.host.has_configuration_stage() {
                    // Switch once Success has left the pipeline in the login stage
                    let host = self.host.clone();
                    channel.execute(move |channel| {
                        channel.set_protocol_stage(ProtocolStage::Play);
                        if let Err(e) = join_game(&host, channel) {
                            tracing::warn!("Connection {} cannot join: {}", channel.id(), e);
                        }
                    })?;
                }
            }
            p if p == packets::login::client::LOGIN_ACK => {
                if self.host.renames_config_pipeline() {
                    self.rename_codecs(channel)?;
                }
                channel.set_protocol_stage(ProtocolStage::Configuration);
                self.send(channel, packets::configuration::server::FINISH_CONFIGURATION, vec![])?;
            }
            p if p == packets::configuration::client::FINISH_CONFIGURATION => {
                channel.set_protocol_stage(ProtocolStage::Play);
                join_game(&self.host, channel)?;
            }

            p if p == packets::play::client::CHAT => {
                let message = first_string(packet).unwrap_or_default();
                let player = channel
                    .attribute::<String>(PLAYER_ATTR)
                    .map(|name| name.as_str().to_string())
                    .unwrap_or_default();
                let line = format!("<{}> {}", player, message);
                if self.host.is_modern() {
                    self.send(
                        channel,
                        packets::play::server::SYSTEM_CHAT,
                        vec![Value::string(line), Value::Bool(false)],
                    )?;
                } else {
                    self.send(
                        channel,
                        packets::play::server::CHAT,
                        vec![Value::string(line), Value::Byte(0), Value::string(player)],
                    )?;
                }
            }

            _ => {}
        }
        Ok(())
    }

    fn send(&self, channel: &Channel, packet: PacketType, values: Vec<Value>) -> Result<()> {
        send_packet(&self.host, channel, packet, values)
    }

    /// Replace the codec pair under the names used from the configuration
    /// stage on, inserted in front of the game stage
    fn rename_codecs(&self, channel: &Channel) -> Result<()> {
        let pipeline = channel.pipeline();
        let old = self.host.codec_names();
        let new = CodecNames::CONFIGURATION;

        let decoder = pipeline
            .remove(old.decoder)
            .ok_or_else(|| TapError::NotFound(format!("stage {}", old.decoder)))?;
        let encoder = pipeline
            .remove(old.encoder)
            .ok_or_else(|| TapError::NotFound(format!("stage {}", old.encoder)))?;
        pipeline.add_before(GAME_STAGE, new.decoder, decoder)?;
        pipeline.add_before(GAME_STAGE, new.encoder, encoder)?;
        tracing::debug!("Connection {} pipeline: {}", channel.id(), pipeline.names().join(", "));
        Ok(())
    }
}

impl Stage for GameHandler {
    fn handle_inbound(&self, ctx: &StageContext<'_>, message: Message) -> Flow {
        let channel = ctx.channel();
        let Some(packet) = message.into_packet() else {
            tracing::warn!("Connection {}: raw bytes reached the game stage", channel.id());
            return Flow::Stop;
        };

        let stage = channel.protocol_stage();
        let packet_type = self.host.packet_of(stage, Direction::Inbound, packet.class_name());
        self.log.record(Delivered {
            connection: channel.id(),
            stage,
            packet_type,
            packet: packet.clone(),
        });

        if let Some(packet_type) = packet_type {
            if let Err(e) = self.respond(channel, packet_type, &packet) {
                tracing::warn!("Connection {}: {} not handled: {}", channel.id(), packet_type, e);
            }
        }
        Flow::Stop
    }
}

fn send_packet(host: &SandboxHost, channel: &Channel, packet: PacketType, values: Vec<Value>) -> Result<()> {
    channel.write(Message::packet(host.new_packet(packet, values)?))
}

fn join_game(host: &SandboxHost, channel: &Channel) -> Result<()> {
    let entity_id = i32::try_from(channel.id().get()).unwrap_or(i32::MAX);
    let game_type = if host.is_modern() { "GameType" } else { "EnumGamemode" };
    send_packet(
        host,
        channel,
        packets::play::server::LOGIN,
        vec![
            Value::Int(entity_id),
            Value::Bool(false),
            Value::enum_constant(game_type, "SURVIVAL"),
        ],
    )
}

fn first_string(packet: &Instance) -> Option<&str> {
    packet.slots().iter().find_map(Value::as_str)
}

fn int_at(packet: &Instance, index: usize) -> Option<i32> {
    match packet.slots().get(index) {
        Some(Value::Int(value)) => Some(*value),
        _ => None,
    }
}
