//! Core error types for PacketTap
//!
//! Every failure the interception engine can report lives here so that the
//! registry, the accessor layer and the injector agree on one taxonomy.
//! None of these errors should ever take the host connection down with it.

/// Failure of a single field read or write
///
/// # Purpose
/// Returned by field accessors and structure modifiers. Only the one access
/// is aborted; the packet and the connection stay usable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("No field {field} in class {class}")]
    NoSuchField { class: String, field: String },

    #[error("Field {field} expects {expected}, got {found}")]
    IncompatibleType {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Field {field} is not accessible without privileged access")]
    Inaccessible { field: String },

    #[error("Cannot write null to primitive field {field}")]
    NullPrimitive { field: String },

    #[error("Value {value} does not fit into {target} (field {field})")]
    Overflow {
        field: String,
        value: String,
        target: String,
    },

    #[error("Target is an instance of {found}, accessor belongs to {expected}")]
    WrongTarget { expected: String, found: String },

    #[error("Packet is read-only for this listener")]
    ReadOnly,
}

#[derive(thiserror::Error, Debug)]
pub enum TapError {
    #[error("Unsupported packet {packet}: {reason}")]
    UnsupportedPacket { packet: String, reason: String },

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Field index {index} is out of bounds for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Injection failure on connection {connection}: {reason}")]
    InjectionFailure { connection: u64, reason: String },

    #[error("Listener {listener} failed on {packet}: {message}")]
    ListenerFault {
        listener: String,
        packet: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel {0} is closed")]
    ChannelClosed(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl TapError {
    /// Whether the error only concerns interception and must never be
    /// surfaced to the host as a connection failure
    pub fn is_interception_only(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPacket { .. }
                | Self::Access(_)
                | Self::IndexOutOfRange { .. }
                | Self::InjectionFailure { .. }
                | Self::ListenerFault { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_error_converts() {
        let err: TapError = AccessError::ReadOnly.into();
        assert!(matches!(err, TapError::Access(AccessError::ReadOnly)));
        assert!(err.is_interception_only());
    }

    #[test]
    fn test_index_error_message() {
        let err = TapError::IndexOutOfRange { index: 3, len: 2 };
        assert_eq!(err.to_string(), "Field index 3 is out of bounds for length 2");
    }

    #[test]
    fn test_io_is_not_interception_only() {
        let err = TapError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!err.is_interception_only());
    }
}
