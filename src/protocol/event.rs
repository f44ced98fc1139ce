//! Outgoing event types and the encoded event frame.
//!
//! The peer reads the whole event buffer on every write and compares each
//! slot's sequence byte with the last one it saw; a changed sequence means
//! a new event for that control.
//!
//! # Example
//!
//! ```
//! use lremote_client::protocol::{EncodedFrame, EventKind};
//! use bytes::Bytes;
//!
//! let frame = EncodedFrame::new(Bytes::from_static(&[0, 0, 0, 0, 1, 1, 0x2C, 0x01]));
//! let record = frame.record(1).unwrap();
//!
//! assert_eq!(record.sequence, 1);
//! assert_eq!(record.kind, Some(EventKind::ValueChange));
//! assert_eq!(record.value, 300);
//! ```

use bytes::Bytes;

use super::wire_format::{EventKind, EVENT_SLOT_SIZE};

/// One user interaction to be sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingEvent {
    pub control_index: usize,
    pub kind: EventKind,
    pub value: u16,
}

impl OutgoingEvent {
    pub fn new(control_index: usize, kind: EventKind, value: u16) -> Self {
        Self {
            control_index,
            kind,
            value,
        }
    }

    /// Value change.
    #[inline]
    pub fn value_change(control_index: usize, value: u16) -> Self {
        Self::new(control_index, EventKind::ValueChange, value)
    }

    /// Button pressed down.
    #[inline]
    pub fn pressed(control_index: usize) -> Self {
        Self::value_change(control_index, 1)
    }

    /// Button released.
    #[inline]
    pub fn released(control_index: usize) -> Self {
        Self::value_change(control_index, 0)
    }

    /// Switch toggled.
    #[inline]
    pub fn toggled(control_index: usize, on: bool) -> Self {
        Self::value_change(control_index, u16::from(on))
    }

    /// Slider released at `position`.
    #[inline]
    pub fn slider_moved(control_index: usize, position: u16) -> Self {
        Self::value_change(control_index, position)
    }
}

/// One decoded slot of the event buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub sequence: u8,
    /// `None` for a slot that has never been written (kind byte 0).
    pub kind: Option<EventKind>,
    pub value: u16,
}

impl EventRecord {
    /// Decode the slot for `control_index` from a buffer.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buffer: &[u8], control_index: usize) -> Option<Self> {
        let start = control_index.checked_mul(EVENT_SLOT_SIZE)?;
        match buffer.get(start..start + EVENT_SLOT_SIZE)? {
            &[sequence, kind, low, high] => Some(Self {
                sequence,
                kind: EventKind::from_byte(kind),
                value: u16::from_le_bytes([low, high]),
            }),
            _ => None,
        }
    }
}

/// Immutable snapshot of the event buffer, ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: Bytes,
}

impl EncodedFrame {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap clone of the underlying `Bytes`.
    #[inline]
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of control slots in the frame.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.bytes.len() / EVENT_SLOT_SIZE
    }

    /// Decode one slot.
    pub fn record(&self, control_index: usize) -> Option<EventRecord> {
        EventRecord::decode(&self.bytes, control_index)
    }
}

impl From<EncodedFrame> for Bytes {
    fn from(frame: EncodedFrame) -> Self {
        frame.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_helpers() {
        assert_eq!(OutgoingEvent::pressed(3).value, 1);
        assert_eq!(OutgoingEvent::released(3).value, 0);
        assert_eq!(OutgoingEvent::toggled(2, true).value, 1);
        assert_eq!(OutgoingEvent::toggled(2, false).value, 0);

        let slider = OutgoingEvent::slider_moved(4, 873);
        assert_eq!(slider.control_index, 4);
        assert_eq!(slider.kind, EventKind::ValueChange);
        assert_eq!(slider.value, 873);
    }

    #[test]
    fn test_record_decode() {
        let buffer = [7, 1, 0xFF, 0x00, 0, 0, 0, 0];
        let first = EventRecord::decode(&buffer, 0).unwrap();
        assert_eq!(first.sequence, 7);
        assert_eq!(first.kind, Some(EventKind::ValueChange));
        assert_eq!(first.value, 255);

        let untouched = EventRecord::decode(&buffer, 1).unwrap();
        assert_eq!(untouched.kind, None);
        assert_eq!(untouched.sequence, 0);

        assert!(EventRecord::decode(&buffer, 2).is_none());
        assert!(EventRecord::decode(&buffer, usize::MAX).is_none());
    }

    #[test]
    fn test_frame_accessors() {
        let frame = EncodedFrame::new(Bytes::from_static(&[0u8; 12]));
        assert_eq!(frame.len(), 12);
        assert_eq!(frame.slot_count(), 3);
        assert!(!frame.is_empty());
        assert!(frame.record(2).is_some());
        assert!(frame.record(3).is_none());

        let bytes: Bytes = frame.clone().into();
        assert_eq!(bytes, frame.to_bytes());
    }
}
