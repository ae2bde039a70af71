//! Shared fixtures for this crate's tests

use crate::context::InterceptionContext;
use packettap_core::ConnectionId;
use packettap_events::{Dispatcher, FaultReporter, ListenerRegistry, ListenerTimings};
use packettap_network::{Channel, Flow, Message, Pipeline, Stage, StageContext};
use packettap_protocol::{packets, PacketType, ServerVersion};
use packettap_reflect::{ClassDef, ClassTable, Instance, StructureModifier, ValueType};
use packettap_registry::{select_shim, HostIntrospection, PacketRegistry, ResolutionPolicy, StructureCache};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Host(Arc<ClassTable>);

impl HostIntrospection for Host {
    fn class_table(&self) -> Arc<ClassTable> {
        self.0.clone()
    }
}

/// Modern class table with the handful of packets the tests use
fn classes() -> Arc<ClassTable> {
    let classes = Arc::new(ClassTable::new());
    let base = classes.register(ClassDef::builder("Packet").build());
    let define = |name: &str, fields: &[(&str, ValueType)]| {
        let mut builder = ClassDef::builder(name).extends(&base);
        for (field, ty) in fields {
            builder = builder.field(*field, ty.clone());
        }
        classes.register(builder.build());
    };

    define(
        "ServerboundIntentionPacket",
        &[
            ("protocolVersion", ValueType::Int),
            ("hostName", ValueType::String),
            ("port", ValueType::Int),
        ],
    );
    define("ServerboundHelloPacket", &[("name", ValueType::String), ("profileId", ValueType::Long)]);
    define("ServerboundChatPacket", &[("message", ValueType::String), ("timeStamp", ValueType::Long)]);
    define(
        "ClientboundPlayerChatPacket",
        &[("message", ValueType::String), ("index", ValueType::Int)],
    );
    classes
}

pub struct Harness {
    pub context: Arc<InterceptionContext>,
    pub listeners: Arc<ListenerRegistry>,
    pub structures: Arc<StructureCache>,
}

impl Harness {
    pub fn new(version: ServerVersion) -> Self {
        let classes = classes();
        let registry = Arc::new(PacketRegistry::new(
            select_shim(version),
            Arc::new(Host(classes)),
            ResolutionPolicy::default(),
        ));
        let structures = Arc::new(StructureCache::new(registry));
        let listeners = Arc::new(ListenerRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            listeners.clone(),
            FaultReporter::new(5),
            ListenerTimings::default(),
        ));
        Self {
            context: Arc::new(InterceptionContext::new(structures.clone(), dispatcher)),
            listeners,
            structures,
        }
    }

    /// Channel with `decoder`, `encoder` (optional) and a recording `game` stage
    pub fn open_channel(
        &self,
        id: u64,
        with_codecs: bool,
    ) -> (Arc<Channel>, mpsc::UnboundedReceiver<Message>, Arc<Mutex<Vec<Instance>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new();
        if with_codecs {
            pipeline.add_last("decoder", Arc::new(PassThrough)).unwrap();
            pipeline.add_last("encoder", Arc::new(PassThrough)).unwrap();
        }
        pipeline.add_last("game", Arc::new(Game(received.clone()))).unwrap();
        let (channel, out) = Channel::open(ConnectionId::new(id), pipeline);
        (channel, out, received)
    }

    pub fn packet_with_string(&self, packet: PacketType, text: &str) -> Instance {
        let mut instance = self.structures.new_packet(packet).unwrap();
        let template = self.structures.template(packet).unwrap();
        let mut modifier = StructureModifier::new(&mut instance, template).unwrap();
        modifier.with_type::<String>().write(0, text.to_string()).unwrap();
        instance
    }

    pub fn chat_in(&self, text: &str) -> Instance {
        self.packet_with_string(packets::play::client::CHAT, text)
    }

    pub fn chat_out(&self, text: &str) -> Instance {
        self.packet_with_string(packets::play::server::CHAT, text)
    }

    pub fn login_start(&self, name: &str) -> Instance {
        self.packet_with_string(packets::login::client::START, name)
    }

    pub fn handshake(&self, protocol: i32) -> Instance {
        let packet = packets::handshake::client::SET_PROTOCOL;
        let mut instance = self.packet_with_string(packet, "localhost");
        let template = self.structures.template(packet).unwrap();
        let mut modifier = StructureModifier::new(&mut instance, template).unwrap();
        modifier.with_type::<i32>().write(0, protocol).unwrap();
        instance
    }

    pub fn first_string(&self, packet: &Instance) -> String {
        let template = self.structures.template_for_class(packet.class());
        let typed = template.with_filter(ValueType::String);
        typed.fields()[0].get(packet).unwrap().as_str().unwrap().to_string()
    }
}

/// Wait until every task queued on `channel` so far has run
pub async fn flush(channel: &Arc<Channel>) {
    channel.submit(|_| ()).await.unwrap();
}

struct PassThrough;

impl Stage for PassThrough {}

struct Game(Arc<Mutex<Vec<Instance>>>);

impl Stage for Game {
    fn handle_inbound(&self, _ctx: &StageContext<'_>, message: Message) -> Flow {
        if let Some(packet) = message.into_packet() {
            self.0.lock().push(packet);
        }
        Flow::Stop
    }
}
