//! Read fan-out with deferral.
//!
//! The session wants every descriptor attribute (plus the device name) read
//! once. Reads are issued eagerly; the first time the transport rejects one
//! because its request queue is full, the remaining reads are held back and
//! re-issued on the next read completion (or retry tick). Reads are never
//! dropped, only deferred.
//!
//! Failed reads are re-queued up to a retry limit; past that the failure is
//! handed back to the session, which ends it.
//!
//! ```text
//!            issue()                        on_arrival()
//! deferred ──────────► in_flight ───────────────────────► done
//!    ▲         │                    │
//!    │ Rejected│                    │ on_failure() (attempts <= limit)
//!    └─────────┘◄───────────────────┘
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::TransportError;
use crate::protocol::AttributeId;
use crate::transport::{RequestStatus, Transport};

/// Default number of times a failed read is re-issued.
pub const DEFAULT_READ_RETRY_LIMIT: u32 = 3;

/// Tracks which attribute reads are deferred, in flight or done.
#[derive(Debug)]
pub struct ReadFanout {
    /// Reads not yet accepted by the transport. Ordered for stable issue order.
    deferred: BTreeSet<AttributeId>,
    /// Reads accepted and awaiting completion.
    in_flight: HashSet<AttributeId>,
    /// Failure count per attribute.
    failures: HashMap<AttributeId, u32>,
    retry_limit: u32,
}

impl ReadFanout {
    /// Create a fan-out for `targets`. Nothing is issued until [`issue`](Self::issue).
    pub fn new(targets: impl IntoIterator<Item = AttributeId>, retry_limit: u32) -> Self {
        Self {
            deferred: targets.into_iter().collect(),
            in_flight: HashSet::new(),
            failures: HashMap::new(),
            retry_limit,
        }
    }

    /// Issue deferred reads until the transport rejects one.
    ///
    /// Returns the number of reads accepted by this call.
    pub fn issue<T: Transport + ?Sized>(&mut self, transport: &mut T) -> usize {
        let mut issued = 0;

        while let Some(&id) = self.deferred.first() {
            match transport.read_attribute(id) {
                RequestStatus::Queued => {
                    self.deferred.remove(&id);
                    self.in_flight.insert(id);
                    issued += 1;
                }
                RequestStatus::Rejected => {
                    tracing::debug!(
                        "Read queue full at {}, deferring {} reads",
                        id,
                        self.deferred.len()
                    );
                    break;
                }
            }
        }

        issued
    }

    /// Record a successful read.
    ///
    /// Returns `false` if the read was not one we were waiting for
    /// (duplicate delivery or an attribute we never asked for).
    pub fn on_arrival(&mut self, id: AttributeId) -> bool {
        let in_flight = self.in_flight.remove(&id);
        let deferred = self.deferred.remove(&id);
        in_flight || deferred
    }

    /// Record a failed read and re-queue it if attempts remain.
    ///
    /// # Errors
    ///
    /// Returns `error` once the attribute has failed more than the retry limit.
    pub fn on_failure(&mut self, id: AttributeId, error: TransportError) -> Result<(), TransportError> {
        self.in_flight.remove(&id);

        let attempts = self.failures.entry(id).or_insert(0);
        *attempts += 1;

        if *attempts > self.retry_limit {
            tracing::warn!("Read of {} failed {} times: {}", id, attempts, error);
            return Err(error);
        }

        tracing::debug!(
            "Read of {} failed ({}/{}), re-queueing: {}",
            id,
            attempts,
            self.retry_limit,
            error
        );
        self.deferred.insert(id);
        Ok(())
    }

    /// Whether any reads are waiting to be issued.
    #[inline]
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Number of reads waiting to be issued.
    #[inline]
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Number of reads awaiting completion.
    #[inline]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether every target has been read.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.deferred.is_empty() && self.in_flight.is_empty()
    }

    /// Forget all outstanding reads. Returns how many were abandoned.
    pub fn clear(&mut self) -> usize {
        let abandoned = self.deferred.len() + self.in_flight.len();
        self.deferred.clear();
        self.in_flight.clear();
        self.failures.clear();
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::protocol::DESCRIPTOR_ATTRIBUTES;
    use crate::transport::PeerId;

    /// Accepts up to `capacity` reads, then rejects until `drain()` is called.
    struct QueueTransport {
        capacity: usize,
        queued: Vec<AttributeId>,
        rejected: usize,
    }

    impl QueueTransport {
        fn new(capacity: usize) -> Self {
            Self {
                capacity,
                queued: Vec::new(),
                rejected: 0,
            }
        }

        fn drain(&mut self) -> Vec<AttributeId> {
            std::mem::take(&mut self.queued)
        }
    }

    impl Transport for QueueTransport {
        fn connect(&mut self, _peer: &PeerId) -> Result<(), TransportError> {
            Ok(())
        }

        fn discover_attributes(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn read_attribute(&mut self, id: AttributeId) -> RequestStatus {
            if self.queued.len() >= self.capacity {
                self.rejected += 1;
                return RequestStatus::Rejected;
            }
            self.queued.push(id);
            RequestStatus::Queued
        }

        fn write_attribute(&mut self, _id: AttributeId, _value: Bytes) -> RequestStatus {
            RequestStatus::Rejected
        }

        fn disconnect(&mut self) {}
    }

    #[test]
    fn test_issue_all_when_queue_is_large() {
        let mut transport = QueueTransport::new(64);
        let mut fanout = ReadFanout::new(DESCRIPTOR_ATTRIBUTES, 3);

        assert_eq!(fanout.issue(&mut transport), DESCRIPTOR_ATTRIBUTES.len());
        assert!(!fanout.has_deferred());
        assert_eq!(fanout.in_flight_count(), DESCRIPTOR_ATTRIBUTES.len());
        assert_eq!(transport.rejected, 0);
    }

    #[test]
    fn test_rejection_defers_rest_of_batch() {
        let mut transport = QueueTransport::new(2);
        let mut fanout = ReadFanout::new(DESCRIPTOR_ATTRIBUTES, 3);

        assert_eq!(fanout.issue(&mut transport), 2);
        assert_eq!(transport.rejected, 1, "stops at first rejection");
        assert_eq!(fanout.deferred_count(), DESCRIPTOR_ATTRIBUTES.len() - 2);
    }

    #[test]
    fn test_deferred_reads_complete_eventually() {
        let mut transport = QueueTransport::new(2);
        let mut fanout = ReadFanout::new(DESCRIPTOR_ATTRIBUTES, 3);
        let mut seen = Vec::new();

        fanout.issue(&mut transport);
        while !fanout.is_done() {
            for id in transport.drain() {
                assert!(fanout.on_arrival(id));
                seen.push(id);
            }
            fanout.issue(&mut transport);
        }

        seen.sort();
        let mut expected = DESCRIPTOR_ATTRIBUTES.to_vec();
        expected.sort();
        assert_eq!(seen, expected, "every read issued exactly once");
    }

    #[test]
    fn test_unexpected_arrival() {
        let mut fanout = ReadFanout::new([AttributeId::Row], 3);
        assert!(!fanout.on_arrival(AttributeId::Names));

        // Arrival of a still-deferred read counts and removes it
        assert!(fanout.on_arrival(AttributeId::Row));
        assert!(fanout.is_done());
        assert!(!fanout.on_arrival(AttributeId::Row));
    }

    #[test]
    fn test_failure_requeues_until_limit() {
        let mut transport = QueueTransport::new(8);
        let mut fanout = ReadFanout::new([AttributeId::Frames], 2);
        let error = TransportError::ReadFailed {
            attribute: AttributeId::Frames,
            status: 257,
        };

        for _ in 0..2 {
            assert_eq!(fanout.issue(&mut transport), 1);
            transport.drain();
            assert!(fanout.on_failure(AttributeId::Frames, error.clone()).is_ok());
            assert!(fanout.has_deferred());
        }

        fanout.issue(&mut transport);
        assert_eq!(
            fanout.on_failure(AttributeId::Frames, error.clone()),
            Err(error)
        );
        assert!(!fanout.has_deferred());
    }

    #[test]
    fn test_clear_abandons_outstanding() {
        let mut transport = QueueTransport::new(3);
        let mut fanout = ReadFanout::new(DESCRIPTOR_ATTRIBUTES, 3);
        fanout.issue(&mut transport);

        assert_eq!(fanout.clear(), DESCRIPTOR_ATTRIBUTES.len());
        assert!(fanout.is_done());
        assert_eq!(fanout.issue(&mut transport), 0);
    }
}
