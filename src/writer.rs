//! Event encoder and write guard for the outgoing event channel.
//!
//! The peer exposes one event characteristic holding a 4-byte slot per
//! control. The client mirrors it in a single buffer: each interaction bumps
//! its control's sequence byte and rewrites the slot, then the whole buffer
//! is written.
//!
//! # Architecture
//!
//! ```text
//! report_interaction ─► queue ─► EventEncoder::submit ─► slot ─► Transport
//!                       (FIFO)    (seq += 1, snapshot)   (one in flight)
//! ```
//!
//! At most one write is in flight. Events arriving meanwhile wait in the
//! queue and are encoded only when they reach the slot, so sequence
//! increments never interleave and a resent frame carries the same
//! sequence number as the original attempt.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::{Result, TransportError};
use crate::protocol::{encode_event, AttributeId, EncodedFrame, OutgoingEvent, EVENT_SLOT_SIZE};
use crate::transport::{RequestStatus, Transport};

/// Default number of times a failed event write is resent.
pub const DEFAULT_WRITE_RETRY_LIMIT: u32 = 2;

/// Owner of the shared event buffer.
///
/// `submit` takes `&mut self`, so a sequence increment and its three field
/// writes can never interleave with another submit.
#[derive(Debug)]
pub struct EventEncoder {
    buffer: BytesMut,
}

impl EventEncoder {
    /// Create a zeroed buffer with one slot per control.
    pub fn new(control_count: usize) -> Self {
        Self {
            buffer: BytesMut::zeroed(control_count * EVENT_SLOT_SIZE),
        }
    }

    /// Encode `event` into its slot and snapshot the whole buffer.
    ///
    /// # Errors
    ///
    /// `Decode(OutOfRange)` if the control index has no slot; the buffer is
    /// left untouched.
    pub fn submit(&mut self, event: OutgoingEvent) -> Result<EncodedFrame> {
        encode_event(
            &mut self.buffer,
            event.control_index,
            event.kind,
            event.value,
        )?;
        Ok(self.snapshot())
    }

    /// Immutable copy of the current buffer.
    pub fn snapshot(&self) -> EncodedFrame {
        EncodedFrame::new(Bytes::copy_from_slice(&self.buffer))
    }

    /// Number of control slots.
    #[inline]
    pub fn control_count(&self) -> usize {
        self.buffer.len() / EVENT_SLOT_SIZE
    }
}

/// Result of a write-complete notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The in-flight event reached the peer.
    Delivered,
    /// The write failed; the same frame will be resent.
    Retrying,
    /// The write failed too many times; the event was dropped.
    Abandoned(TransportError),
    /// No write was in flight.
    Unexpected,
}

#[derive(Debug, Default)]
enum Slot {
    /// Nothing encoded, nothing in flight.
    #[default]
    Idle,
    /// Encoded but not yet accepted by the transport.
    Pending { frame: EncodedFrame, attempts: u32 },
    /// Accepted by the transport, waiting for the write-complete.
    InFlight { frame: EncodedFrame, attempts: u32 },
}

/// Serializes event writes: FIFO queue in front of a single in-flight slot.
#[derive(Debug)]
pub struct EventWriter {
    encoder: EventEncoder,
    queue: VecDeque<OutgoingEvent>,
    slot: Slot,
    retry_limit: u32,
}

impl EventWriter {
    pub fn new(encoder: EventEncoder, retry_limit: u32) -> Self {
        Self {
            encoder,
            queue: VecDeque::new(),
            slot: Slot::Idle,
            retry_limit,
        }
    }

    /// Queue an event behind any earlier ones.
    pub fn enqueue(&mut self, event: OutgoingEvent) {
        self.queue.push_back(event);
    }

    /// Move the queue forward as far as the transport allows.
    ///
    /// Encodes the next event if the slot is free and tries to hand the
    /// frame to the transport. A rejected write stays pending for the next
    /// pump. Returns the number of events dropped because they could not be
    /// encoded.
    pub fn pump<T: Transport + ?Sized>(&mut self, transport: &mut T) -> usize {
        let mut dropped = 0;

        loop {
            match std::mem::take(&mut self.slot) {
                Slot::InFlight { frame, attempts } => {
                    self.slot = Slot::InFlight { frame, attempts };
                    return dropped;
                }
                Slot::Pending { frame, attempts } => {
                    match transport.write_attribute(AttributeId::EventChannel, frame.to_bytes()) {
                        RequestStatus::Queued => {
                            self.slot = Slot::InFlight { frame, attempts };
                        }
                        RequestStatus::Rejected => {
                            tracing::debug!("Write queue full, deferring event frame");
                            self.slot = Slot::Pending { frame, attempts };
                        }
                    }
                    return dropped;
                }
                Slot::Idle => {
                    let Some(event) = self.queue.pop_front() else {
                        return dropped;
                    };
                    match self.encoder.submit(event) {
                        Ok(frame) => self.slot = Slot::Pending { frame, attempts: 0 },
                        Err(e) => {
                            tracing::warn!(
                                "Dropping event for control {}: {}",
                                event.control_index,
                                e
                            );
                            dropped += 1;
                        }
                    }
                }
            }
        }
    }

    /// Handle the transport's write-complete for the in-flight frame.
    pub fn on_write_complete(&mut self, result: std::result::Result<(), TransportError>) -> WriteOutcome {
        let (frame, attempts) = match std::mem::take(&mut self.slot) {
            Slot::InFlight { frame, attempts } => (frame, attempts),
            other => {
                self.slot = other;
                tracing::warn!("Write completion with no write in flight");
                return WriteOutcome::Unexpected;
            }
        };

        match result {
            Ok(()) => WriteOutcome::Delivered,
            Err(e) if attempts < self.retry_limit => {
                tracing::debug!(
                    "Event write failed ({}/{}), resending: {}",
                    attempts + 1,
                    self.retry_limit,
                    e
                );
                self.slot = Slot::Pending {
                    frame,
                    attempts: attempts + 1,
                };
                WriteOutcome::Retrying
            }
            Err(e) => {
                tracing::warn!("Event write failed after {} attempts: {}", attempts + 1, e);
                WriteOutcome::Abandoned(e)
            }
        }
    }

    /// Events waiting behind the slot.
    #[inline]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether a frame is encoded but not yet accepted, or accepted and unacknowledged.
    #[inline]
    pub fn is_busy(&self) -> bool {
        !matches!(self.slot, Slot::Idle)
    }

    /// Whether a frame is waiting for a transport write-complete.
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        matches!(self.slot, Slot::InFlight { .. })
    }

    /// Current buffer contents.
    pub fn snapshot(&self) -> EncodedFrame {
        self.encoder.snapshot()
    }

    /// Drop everything queued or in flight. Returns how many events were discarded.
    pub fn discard(&mut self) -> usize {
        let in_slot = usize::from(self.is_busy());
        let discarded = self.queue.len() + in_slot;
        self.queue.clear();
        self.slot = Slot::Idle;
        discarded
    }
}
