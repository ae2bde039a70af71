//! PacketTap Core - Shared error taxonomy and identifiers

mod error;
mod types;
mod idgen;

pub use error::*;
pub use types::*;
pub use idgen::*;
