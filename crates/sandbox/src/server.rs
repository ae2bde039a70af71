//! # Sandbox TCP Server
//!
//! Accepts connections, gives each one a [`Channel`] with the sandbox
//! pipeline and moves JSON lines between the socket and the channel.
//!
//! # Architecture
//!
//! ```text
//! socket ──LinesCodec──> reader ──fire_inbound──> channel task ──> pipeline
//! socket <──LinesCodec── writer <──outbound sink──────────────────┘
//! ```
//!
//! One reader and one writer task per connection. The connection hook runs
//! before the first line is read, so whatever it installs sees the
//! handshake.

use crate::game::{build_pipeline, PacketLog};
use crate::host::SandboxHost;
use dashmap::DashMap;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use packettap_core::{ConnectionId, IdGenerator, Result};
use packettap_network::{Channel, Message};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

/// Longest line the sandbox accepts
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Called for every accepted connection before it reads anything
pub type ConnectHook = Arc<dyn Fn(&Arc<Channel>) + Send + Sync>;

type LineSink = SplitSink<Framed<TcpStream, LinesCodec>, String>;

pub struct SandboxServer {
    host: Arc<SandboxHost>,
    log: Arc<PacketLog>,
    listener: TcpListener,
    connections: Arc<DashMap<ConnectionId, Arc<Channel>>>,
    ids: IdGenerator<ConnectionId>,
    on_connect: Option<ConnectHook>,
}

impl SandboxServer {
    /// Bind the server
    ///
    /// # Arguments
    /// * `addr` - Listen address; port 0 picks a free port
    /// * `host` - Server version and classes
    pub async fn bind(addr: SocketAddr, host: Arc<SandboxHost>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            "Sandbox {} listening on {}",
            host.version().raw,
            listener.local_addr()?
        );
        Ok(Self {
            host,
            log: Arc::new(PacketLog::new()),
            listener,
            connections: Arc::new(DashMap::new()),
            ids: IdGenerator::new(),
            on_connect: None,
        })
    }

    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Channel>) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn host(&self) -> &Arc<SandboxHost> {
        &self.host
    }

    /// Packets delivered to the game logic of every connection
    pub fn log(&self) -> &Arc<PacketLog> {
        &self.log
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Channel>> {
        self.connections.get(&id).map(|entry| entry.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Accept connections until `shutdown` completes, then close them all
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((socket, addr)) => self.accept(socket, addr),
                    Err(e) => tracing::error!("Error accepting connection: {:?}", e),
                },
                _ = &mut shutdown => {
                    tracing::info!("Sandbox server shutting down");
                    break;
                }
            }
        }

        let closed = self.close_all();
        tracing::info!("Closed {} sandbox connection(s)", closed);
        Ok(())
    }

    /// Close every open connection
    pub fn close_all(&self) -> usize {
        let channels: Vec<Arc<Channel>> = self.connections.iter().map(|entry| entry.value().clone()).collect();
        for channel in &channels {
            channel.close();
        }
        channels.len()
    }

    fn accept(&self, socket: TcpStream, addr: SocketAddr) {
        let id: ConnectionId = self.ids.next_id();
        let pipeline = match build_pipeline(&self.host, &self.log) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                tracing::error!("Cannot build pipeline for {}: {}", addr, e);
                return;
            }
        };

        let (channel, outbound) = Channel::open(id, pipeline);
        self.connections.insert(id, channel.clone());
        if let Some(hook) = &self.on_connect {
            hook(&channel);
        }

        let connections = self.connections.clone();
        tokio::spawn(async move {
            tracing::info!("Connection {} from {}", id, addr);
            serve(socket, channel, outbound).await;
            connections.remove(&id);
            tracing::info!("Connection {} closed", id);
        });
    }
}

async fn serve(socket: TcpStream, channel: Arc<Channel>, mut outbound: mpsc::UnboundedReceiver<Message>) {
    let framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (mut sink, mut lines) = framed.split();

    let writer_channel = channel.clone();
    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                message = outbound.recv() => message,
                _ = writer_channel.wait_closed() => None,
            };
            let Some(message) = message else {
                break;
            };
            if !send_line(&mut sink, writer_channel.id(), message).await {
                return;
            }
        }

        // Flush what the pipeline produced before it closed
        while let Ok(message) = outbound.try_recv() {
            if !send_line(&mut sink, writer_channel.id(), message).await {
                return;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let line = tokio::select! {
            line = lines.next() => line,
            _ = channel.wait_closed() => break,
        };
        match line {
            Some(Ok(line)) => {
                if channel.fire_inbound(Message::wire(line)).is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Connection {} read error: {}", channel.id(), e);
                break;
            }
            None => break,
        }
    }

    channel.close();
    channel.wait_closed().await;
    let _ = writer.await;
}

/// Write one outbound message; `false` once the socket is gone
async fn send_line(sink: &mut LineSink, id: ConnectionId, message: Message) -> bool {
    let line = match message {
        Message::Wire(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Message::Packet(envelope) => {
            tracing::warn!(
                "Connection {}: unencoded {} reached the socket",
                id,
                envelope.packet.class_name()
            );
            return true;
        }
    };
    match sink.send(line).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Connection {} write failed: {}", id, e);
            false
        }
    }
}
