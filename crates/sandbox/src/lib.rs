//! PacketTap Sandbox - a small versioned game server to intercept
//!
//! Implements just enough of a server for the engine to be exercised end to
//! end: per-version class tables, a JSON lines wire format, a game logic
//! stage that walks the protocol stages, and a TCP server.

pub mod classes;
pub mod codec;
pub mod game;
pub mod host;
pub mod server;

#[cfg(test)]
mod scenarios;

pub use classes::{HostPacket, PACKET_BASE, RENAMED_SYSTEM_CHAT};
pub use codec::{decode_frame, encode_frame, JsonDecoder, JsonEncoder, WireFrame};
pub use game::{build_pipeline, Delivered, GameHandler, PacketLog, PLAYER_ATTR};
pub use host::{CodecNames, SandboxHost, GAME_STAGE};
pub use server::{ConnectHook, SandboxServer, MAX_LINE_LENGTH};
