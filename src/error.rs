//! Error types for lremote-client.

use thiserror::Error;

use crate::protocol::{AttributeId, ControlKind};

/// Malformed peer data. Fatal to panel assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Control-type byte outside the known set.
    #[error("Unknown control kind byte: {0:#04x}")]
    UnknownKind(u8),

    /// A fixed-size field had fewer bytes than required.
    #[error("Truncated {field}: need {needed} bytes, have {available}")]
    TruncatedInput {
        /// Field being decoded.
        field: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// A value or offset exceeded its permitted bound.
    #[error("{field} out of range: {value} exceeds limit {limit}")]
    OutOfRange {
        /// Field being checked.
        field: &'static str,
        /// Offending value.
        value: i64,
        /// Bound it was checked against.
        limit: i64,
    },
}

/// Failures reported by (or about) the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Attribute discovery failed.
    #[error("Attribute discovery failed: {0}")]
    DiscoveryFailed(String),

    /// An attribute read completed with a non-success status.
    #[error("Read of {attribute} failed with status {status}")]
    ReadFailed {
        /// Attribute that was read.
        attribute: AttributeId,
        /// Platform status code.
        status: i32,
    },

    /// An attribute write completed with a non-success status.
    #[error("Write failed with status {status}")]
    WriteFailed {
        /// Platform status code.
        status: i32,
    },

    /// The link dropped.
    #[error("Disconnected")]
    Disconnected,
}

/// Main error type for all lremote operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Transport-level failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Peer sent a malformed descriptor.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Protocol misuse (e.g. assembling twice).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Discovery did not report every descriptor attribute.
    #[error("Peer is missing descriptor attributes: {0:?}")]
    MissingAttributes(Vec<AttributeId>),

    /// Interaction addressed a control index the panel doesn't have.
    #[error("Unknown control index: {0}")]
    UnknownControl(usize),

    /// Interaction reported for a control that never emits events.
    #[error("Control {index} ({kind:?}) does not emit events")]
    UnsupportedInteraction {
        /// Control index.
        index: usize,
        /// Control kind.
        kind: ControlKind,
    },

    /// Too many interactions waiting to be written.
    #[error("Interaction backlog full")]
    Busy,

    /// The session has terminated.
    #[error("Session closed")]
    SessionClosed,
}

/// Result type alias using RemoteError.
pub type Result<T> = std::result::Result<T, RemoteError>;
