//! Transport module - the seam to the platform's wireless stack.
//!
//! Requests go out through the [`Transport`] trait and never block: each one
//! either gets queued by the platform or is rejected because its request
//! queue is full. Completions come back later, on whatever context the
//! platform uses, as typed [`TransportEvent`] messages posted to the session
//! through [`SessionHandle::notify`](crate::SessionHandle::notify).
//!
//! ```text
//! Session ── connect / discover / read / write ──► Transport (platform)
//!    ▲                                                  │
//!    └──────── SessionHandle::notify(TransportEvent) ◄──┘
//! ```
//!
//! [`memory`] provides an in-process simulated peer.

pub mod memory;

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;

use crate::error::TransportError;
use crate::protocol::AttributeId;

/// Address of the peer device (e.g. a BLE MAC address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of submitting a request to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Accepted; a completion notification will follow.
    Queued,
    /// The request queue is full. Nothing will follow; try again later.
    Rejected,
}

impl RequestStatus {
    #[inline]
    pub fn is_queued(self) -> bool {
        self == RequestStatus::Queued
    }
}

/// Link state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Completion and state notifications from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Link came up or went down.
    Connection(ConnectionState),
    /// Attribute discovery finished.
    DiscoveryComplete(Result<HashSet<AttributeId>, TransportError>),
    /// An attribute read finished.
    AttributeRead {
        id: AttributeId,
        result: Result<Bytes, TransportError>,
    },
    /// The in-flight attribute write finished.
    WriteComplete(Result<(), TransportError>),
}

/// Requests the session issues to the platform stack.
///
/// Implementations must not block: queue the work and report completion
/// through the session handle.
pub trait Transport: Send + 'static {
    /// Start connecting to `peer`. Completion: [`TransportEvent::Connection`].
    fn connect(&mut self, peer: &PeerId) -> Result<(), TransportError>;

    /// Start attribute discovery. Completion: [`TransportEvent::DiscoveryComplete`].
    fn discover_attributes(&mut self) -> Result<(), TransportError>;

    /// Request a read. Completion: [`TransportEvent::AttributeRead`].
    fn read_attribute(&mut self, id: AttributeId) -> RequestStatus;

    /// Request a write. Completion: [`TransportEvent::WriteComplete`].
    fn write_attribute(&mut self, id: AttributeId, value: Bytes) -> RequestStatus;

    /// Tear the link down and drop any queued requests.
    fn disconnect(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_display() {
        let peer = PeerId::new("C4:7F:51:00:12:34");
        assert_eq!(peer.to_string(), "C4:7F:51:00:12:34");
    }

    #[test]
    fn test_request_status() {
        assert!(RequestStatus::Queued.is_queued());
        assert!(!RequestStatus::Rejected.is_queued());
    }
}
