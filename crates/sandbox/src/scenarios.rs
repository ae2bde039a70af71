//! End-to-end runs of the engine against the sandbox server over TCP

use crate::codec::WireFrame;
use crate::host::{CodecNames, SandboxHost};
use crate::server::SandboxServer;
use futures::{SinkExt, StreamExt};
use packettap::{
    packets, ChannelInjector, ConnectionId, InjectionState, ListenerOptions, ProtocolManager, ServerVersion,
    TapConfig, INBOUND_STAGE, OUTBOUND_STAGE,
};
use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};

const V1_16_5: ServerVersion = ServerVersion::new(1, 16, 5);
const V1_20_4: ServerVersion = ServerVersion::new(1, 20, 4);
const V1_20_6: ServerVersion = ServerVersion::new(1, 20, 6);

struct Sandbox {
    manager: Arc<ProtocolManager>,
    server: Arc<SandboxServer>,
    injectors: Arc<Mutex<Vec<Arc<ChannelInjector>>>>,
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    running: JoinHandle<packettap::Result<()>>,
}

impl Sandbox {
    async fn start(host: SandboxHost, config: TapConfig) -> Self {
        let host = Arc::new(host);
        let manager = Arc::new(ProtocolManager::initialize(host.version().clone(), host.clone(), config).unwrap());

        let injectors = Arc::new(Mutex::new(Vec::new()));
        let hook_manager = manager.clone();
        let hooked = injectors.clone();
        let server = SandboxServer::bind(SocketAddr::from(([127, 0, 0, 1], 0)), host)
            .await
            .unwrap()
            .on_connect(move |channel| match hook_manager.inject_channel(channel) {
                Ok(injector) => hooked.lock().push(injector),
                Err(e) => tracing::warn!("Not intercepting {}: {}", channel.id(), e),
            });
        let server = Arc::new(server);
        let addr = server.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let running = {
            let server = server.clone();
            tokio::spawn(async move {
                server
                    .run_until(async {
                        let _ = stopped.await;
                    })
                    .await
            })
        };

        Self {
            manager,
            server,
            injectors,
            addr,
            stop,
            running,
        }
    }

    fn redact_chat(&self) {
        self.manager
            .register_listener(
                &[packets::play::client::CHAT],
                ListenerOptions::new().priority(5).named("redactor"),
                |event| {
                    event.packet_mut()?.write(0, "REDACTED".to_string())?;
                    Ok(())
                },
            )
            .unwrap();
    }

    fn injector(&self, index: usize) -> Arc<ChannelInjector> {
        self.injectors.lock()[index].clone()
    }

    fn pipeline_of(&self, connection: ConnectionId) -> Vec<String> {
        self.server.connection(connection).unwrap().pipeline().names()
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.running.await.unwrap().unwrap();
    }
}

struct Client {
    lines: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.unwrap();
        Self {
            lines: Framed::new(socket, LinesCodec::new()),
        }
    }

    async fn send(&mut self, packet: &str, fields: Vec<Json>) {
        let line = serde_json::to_string(&WireFrame::new(packet, fields)).unwrap();
        self.lines.send(line).await.unwrap();
    }

    async fn expect(&mut self, packet: &str) -> WireFrame {
        let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next())
            .await
            .expect("no frame within 10s")
            .expect("connection closed")
            .unwrap();
        let frame: WireFrame = serde_json::from_str(&line).unwrap();
        assert_eq!(frame.packet, packet, "{:?}", frame);
        frame
    }

    async fn join(&mut self, protocol: i32, name: &str, configuration: bool) {
        self.send("SetProtocol", vec![json!(protocol), json!("localhost"), json!(25565), json!(2)])
            .await;
        self.send("Start", vec![json!(name)]).await;
        self.expect("Success").await;
        if configuration {
            self.send("LoginAck", vec![]).await;
            self.expect("FinishConfiguration").await;
            self.send("FinishConfiguration", vec![]).await;
        }
        self.expect("Login").await;
    }

    async fn chat(&mut self, message: &str) {
        self.send("Chat", vec![json!(message)]).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chat_is_redacted() {
    let sandbox = Sandbox::start(SandboxHost::new(V1_20_4), TapConfig::default()).await;
    sandbox.redact_chat();

    let mut client = Client::connect(sandbox.addr).await;
    client.join(765, "Alex", true).await;
    client.chat("hello").await;
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> REDACTED"));

    let injector = sandbox.manager.injector_for_player("Alex").unwrap();
    assert_eq!(injector.protocol_version(), Some(765));
    let connection = injector.connection_id();

    // Synthetic packets merge into the same stream
    let mut synthetic = sandbox.manager.create_packet(packets::play::client::CHAT).unwrap();
    synthetic.write(0, "hello".to_string()).unwrap();
    sandbox
        .manager
        .receive_client_packet(connection, synthetic.clone())
        .unwrap();
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> REDACTED"));
    sandbox
        .manager
        .receive_client_packet_unfiltered(connection, synthetic)
        .unwrap();
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> hello"));

    let delivered = sandbox.server.log().of(connection, packets::play::client::CHAT);
    let texts: Vec<&str> = delivered.iter().filter_map(|entry| entry.text()).collect();
    assert_eq!(texts, vec!["REDACTED", "REDACTED", "hello"]);

    let mut notice = sandbox.manager.create_packet(packets::play::server::SYSTEM_CHAT).unwrap();
    notice.write(0, "server notice".to_string()).unwrap();
    sandbox.manager.send_server_packet(connection, notice).unwrap();
    assert_eq!(
        client.expect("SystemChat").await.fields,
        vec![json!("server notice"), json!(false)]
    );

    sandbox.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_injection_failure_keeps_connection_working() {
    let host = SandboxHost::new(V1_20_4).with_codec_names(CodecNames {
        decoder: "frame_decoder",
        encoder: "frame_encoder",
    });
    let sandbox = Sandbox::start(host, TapConfig::default()).await;
    sandbox.redact_chat();

    let mut client = Client::connect(sandbox.addr).await;
    client.join(765, "Alex", true).await;
    client.chat("hello").await;
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> hello"));

    let injector = sandbox.injector(0);
    assert_eq!(injector.state(), InjectionState::Detached);
    assert!(injector.failure().is_some());
    let connection = injector.connection_id();
    let cached = sandbox.manager.injector(connection).unwrap();
    assert!(Arc::ptr_eq(&cached, &injector));
    assert_eq!(
        sandbox.pipeline_of(connection),
        vec!["frame_decoder", "frame_encoder", "game"]
    );

    // Synthetic packets still reach the connection, past no listeners
    let mut synthetic = sandbox.manager.create_packet(packets::play::client::CHAT).unwrap();
    synthetic.write(0, "injected".to_string()).unwrap();
    sandbox.manager.receive_client_packet(connection, synthetic).unwrap();
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> injected"));

    let mut notice = sandbox.manager.create_packet(packets::play::server::SYSTEM_CHAT).unwrap();
    notice.write(0, "server notice".to_string()).unwrap();
    sandbox.manager.send_server_packet_unfiltered(connection, notice).unwrap();
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("server notice"));

    sandbox.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_preserved_per_connection() {
    const CLIENTS: usize = 4;
    const MESSAGES: usize = 100;

    let sandbox = Sandbox::start(SandboxHost::new(V1_20_4), TapConfig::default()).await;
    let observed = Arc::new(Mutex::new(Vec::new()));
    let recorder = observed.clone();
    sandbox
        .manager
        .register_listener(&[packets::play::client::CHAT], ListenerOptions::new(), move |event| {
            let text: String = event.packet().read(0)?;
            recorder.lock().push((event.connection(), text));
            Ok(())
        })
        .unwrap();

    let clients: Vec<_> = (0..CLIENTS)
        .map(|index| {
            let addr = sandbox.addr;
            tokio::spawn(async move {
                let name = format!("p{}", index);
                let mut client = Client::connect(addr).await;
                client.join(765, &name, true).await;
                for n in 0..MESSAGES {
                    client.chat(&n.to_string()).await;
                }
                for n in 0..MESSAGES {
                    let echo = client.expect("SystemChat").await;
                    assert_eq!(echo.fields[0], json!(format!("<{}> {}", name, n)));
                }
            })
        })
        .collect();
    for client in clients {
        client.await.unwrap();
    }

    let mut per_connection: HashMap<Option<ConnectionId>, Vec<String>> = HashMap::new();
    for (connection, text) in observed.lock().iter() {
        per_connection.entry(*connection).or_default().push(text.clone());
    }
    assert_eq!(per_connection.len(), CLIENTS);
    let expected: Vec<String> = (0..MESSAGES).map(|n| n.to_string()).collect();
    for (connection, texts) in per_connection {
        assert!(connection.is_some());
        assert_eq!(texts, expected);
    }

    sandbox.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_all_restores_pipelines() {
    let sandbox = Sandbox::start(SandboxHost::new(V1_20_4), TapConfig::default()).await;
    sandbox.redact_chat();

    let mut client = Client::connect(sandbox.addr).await;
    client.join(765, "Alex", true).await;
    client.chat("hello").await;
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> REDACTED"));

    let connection = sandbox.injector(0).connection_id();
    assert_eq!(
        sandbox.pipeline_of(connection),
        vec!["decoder", INBOUND_STAGE, "encoder", OUTBOUND_STAGE, "game"]
    );

    assert_eq!(sandbox.manager.shutdown_all().await, 1);
    assert!(sandbox.manager.listeners().is_empty());
    assert_eq!(sandbox.pipeline_of(connection), vec!["decoder", "encoder", "game"]);

    client.chat("after").await;
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> after"));

    sandbox.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_legacy_server() {
    let config = TapConfig {
        server_version: V1_16_5,
        ..TapConfig::default()
    };
    let sandbox = Sandbox::start(SandboxHost::new(V1_16_5), config).await;
    assert_eq!(sandbox.manager.shim().name(), "legacy");
    assert!(!sandbox.manager.is_supported(packets::play::server::SYSTEM_CHAT));

    sandbox
        .manager
        .register_listener(
            &[packets::play::server::CHAT],
            ListenerOptions::new().named("censor"),
            |event| {
                let text: String = event.packet().read(0)?;
                if text.contains("secret") {
                    event.cancel()?;
                }
                Ok(())
            },
        )
        .unwrap();

    let mut client = Client::connect(sandbox.addr).await;
    client.join(754, "Steve", false).await;
    client.chat("secret").await;
    client.chat("public").await;
    let echo = client.expect("Chat").await;
    assert_eq!(echo.fields, vec![json!("<Steve> public"), json!(0), json!("Steve")]);

    let connection = sandbox.injector(0).connection_id();
    assert_eq!(sandbox.server.log().of(connection, packets::play::client::CHAT).len(), 2);

    // Fields inherited from the superclass are addressable like own fields
    let mut movement = sandbox.manager.create_packet(packets::play::server::REL_ENTITY_MOVE).unwrap();
    movement.write(0, 42i32).unwrap();
    movement.write(2, 3i16).unwrap();
    movement.write(0, true).unwrap();
    sandbox.manager.send_server_packet(connection, movement).unwrap();
    let frame = client.expect("RelEntityMove").await;
    assert_eq!(frame.fields, vec![json!(42), json!(0), json!(0), json!(3), json!(true)]);

    sandbox.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_rename_keeps_interception() {
    let sandbox = Sandbox::start(SandboxHost::new(V1_20_6), TapConfig::default()).await;
    sandbox
        .manager
        .register_listener(
            &[packets::play::client::CHAT],
            ListenerOptions::new().priority(10).named("broken"),
            |_| anyhow::bail!("always fails"),
        )
        .unwrap();
    sandbox.redact_chat();

    let mut client = Client::connect(sandbox.addr).await;
    client.join(766, "Alex", true).await;
    client.chat("hello").await;
    assert_eq!(client.expect("SystemChat").await.fields[0], json!("<Alex> REDACTED"));

    let injector = sandbox.injector(0);
    assert!(injector.is_injected());
    assert_eq!(
        sandbox.pipeline_of(injector.connection_id()),
        vec!["inbound_config", INBOUND_STAGE, "outbound_config", OUTBOUND_STAGE, "game"]
    );
    assert_eq!(sandbox.manager.dispatcher().faults().total_faults(), 1);

    sandbox.stop().await;
}
