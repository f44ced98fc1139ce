//! Wire format encoding and decoding.
//!
//! Per-control blobs are flat arrays indexed by control position:
//! ```text
//! ControlTypes  [kind]                          1 byte / control
//! Colors        [color]                         1 byte / control
//! Frames        [left, top, width, height]      4 bytes / control, u8
//! ConfigData    [data1, data2, data3, data4]    8 bytes / control, u16 LE
//! EventChannel  [seq, kind, value_lo, value_hi] 4 bytes / control
//! ```
//!
//! Scalar attributes (`Row`, `Col`, `Orientation`, `ControlCount`) are
//! int32 Little Endian. `Names` is UTF-8 text, one label per line.
//!
//! Every decoder rejects malformed input instead of guessing, except the
//! names blob: labels are cosmetic, so missing entries fall back to a
//! placeholder.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::panel::{ControlCell, ControlConfig};
use crate::error::DecodeError;

/// Bytes per control in the `Frames` blob.
pub const FRAME_SIZE: usize = 4;

/// Bytes per control in the `ConfigData` blob.
pub const CONFIG_SIZE: usize = 8;

/// Bytes per control in the event buffer.
pub const EVENT_SLOT_SIZE: usize = 4;

/// Bytes in a scalar attribute.
pub const SCALAR_SIZE: usize = 4;

/// Separator between labels in the `Names` blob.
pub const NAME_DELIMITER: char = '\n';

/// Control-type byte codes.
pub mod kind_codes {
    pub const LABEL: u8 = 1;
    pub const PUSH_BUTTON: u8 = 2;
    pub const CIRCLE_BUTTON: u8 = 3;
    pub const SWITCH_BUTTON: u8 = 4;
    pub const SLIDER: u8 = 5;
}

/// Event-kind byte codes.
pub mod event_codes {
    pub const VALUE_CHANGE: u8 = 1;
}

/// Kind of control, decoded from one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKind {
    Label,
    CircleButton,
    PushButton,
    SwitchButton,
    Slider,
}

impl ControlKind {
    /// Decode from the wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            kind_codes::LABEL => Ok(ControlKind::Label),
            kind_codes::PUSH_BUTTON => Ok(ControlKind::PushButton),
            kind_codes::CIRCLE_BUTTON => Ok(ControlKind::CircleButton),
            kind_codes::SWITCH_BUTTON => Ok(ControlKind::SwitchButton),
            kind_codes::SLIDER => Ok(ControlKind::Slider),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }

    /// Encode to the wire byte.
    pub fn to_byte(self) -> u8 {
        match self {
            ControlKind::Label => kind_codes::LABEL,
            ControlKind::PushButton => kind_codes::PUSH_BUTTON,
            ControlKind::CircleButton => kind_codes::CIRCLE_BUTTON,
            ControlKind::SwitchButton => kind_codes::SWITCH_BUTTON,
            ControlKind::Slider => kind_codes::SLIDER,
        }
    }

    /// Labels are display-only.
    #[inline]
    pub fn emits_events(self) -> bool {
        self != ControlKind::Label
    }
}

/// Kind of outgoing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ValueChange,
}

impl EventKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            event_codes::VALUE_CHANGE => Some(EventKind::ValueChange),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            EventKind::ValueChange => event_codes::VALUE_CHANGE,
        }
    }
}

/// Decode a single control-type byte.
#[inline]
pub fn decode_control_kind(byte: u8) -> Result<ControlKind, DecodeError> {
    ControlKind::from_byte(byte)
}

/// Decode an int32 LE scalar attribute from offset 0.
pub fn decode_scalar(field: &'static str, bytes: &[u8]) -> Result<i32, DecodeError> {
    let raw: [u8; SCALAR_SIZE] = bytes
        .get(..SCALAR_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(DecodeError::TruncatedInput {
            field,
            needed: SCALAR_SIZE,
            available: bytes.len(),
        })?;
    Ok(i32::from_le_bytes(raw))
}

/// Decode a scalar that must be strictly positive (grid dimensions).
pub fn decode_dimension(field: &'static str, bytes: &[u8]) -> Result<u32, DecodeError> {
    let value = decode_scalar(field, bytes)?;
    if value <= 0 {
        return Err(DecodeError::OutOfRange {
            field,
            value: i64::from(value),
            limit: 1,
        });
    }
    Ok(value as u32)
}

/// Decode the control count (non-negative).
pub fn decode_control_count(bytes: &[u8]) -> Result<usize, DecodeError> {
    let value = decode_scalar("control count", bytes)?;
    usize::try_from(value).map_err(|_| DecodeError::OutOfRange {
        field: "control count",
        value: i64::from(value),
        limit: 0,
    })
}

/// Decode the orientation flag. Any positive value means landscape.
pub fn decode_orientation(bytes: &[u8]) -> Result<bool, DecodeError> {
    Ok(decode_scalar("orientation", bytes)? > 0)
}

/// Read the one-byte entry for `index` from a per-control byte array.
pub fn decode_byte_at(field: &'static str, bytes: &[u8], index: usize) -> Result<u8, DecodeError> {
    bytes.get(index).copied().ok_or(DecodeError::OutOfRange {
        field,
        value: (index as i64).saturating_add(1),
        limit: bytes.len() as i64,
    })
}

/// Decode the config block for the control at `index`.
///
/// The slot is bytes `[index*8, index*8+8)`: four u16 LE in order
/// `data1..data4`.
pub fn decode_config(bytes: &[u8], index: usize) -> Result<ControlConfig, DecodeError> {
    let end = index
        .checked_mul(CONFIG_SIZE)
        .and_then(|start| start.checked_add(CONFIG_SIZE));
    let slot = end
        .and_then(|end| bytes.get(end - CONFIG_SIZE..end))
        .ok_or(DecodeError::TruncatedInput {
            field: "config data",
            needed: end.unwrap_or(usize::MAX),
            available: bytes.len(),
        })?;

    let word = |i: usize| u16::from_le_bytes([slot[i * 2], slot[i * 2 + 1]]);
    Ok(ControlConfig::new(word(0), word(1), word(2), word(3)))
}

/// Decode the cell for the control at `index` from the `Frames` blob.
pub fn decode_frames(bytes: &[u8], index: usize) -> Result<ControlCell, DecodeError> {
    let end = index
        .checked_mul(FRAME_SIZE)
        .and_then(|start| start.checked_add(FRAME_SIZE));
    match end.and_then(|end| bytes.get(end - FRAME_SIZE..end)) {
        Some(&[left, top, width, height]) => Ok(ControlCell::new(left, top, width, height)),
        _ => Err(DecodeError::OutOfRange {
            field: "frames",
            value: end.map_or(i64::MAX, |end| end as i64),
            limit: bytes.len() as i64,
        }),
    }
}

/// Split the `Names` blob into per-control labels.
///
/// Trailing NUL padding and trailing empty entries are dropped, so those
/// controls receive the placeholder instead of an empty label.
pub fn decode_names(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(strip_nul_padding(bytes));

    let mut names: Vec<String> = text.split(NAME_DELIMITER).map(str::to_owned).collect();
    while names.last().is_some_and(|n| n.is_empty()) {
        names.pop();
    }
    names
}

/// Decode the GAP device name. `None` when the name is empty.
pub fn decode_device_name(bytes: &[u8]) -> Option<String> {
    let name = String::from_utf8_lossy(strip_nul_padding(bytes));
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

fn strip_nul_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    &bytes[..end]
}

/// Label for `index`, or `placeholder` when the names blob is short.
pub fn label_or_placeholder(names: &[String], index: usize, placeholder: &str) -> String {
    names
        .get(index)
        .cloned()
        .unwrap_or_else(|| placeholder.to_string())
}

/// Write one event record into its slot of the shared event buffer.
///
/// Increments the rolling sequence byte (wrapping), then writes the kind
/// and the value (low byte first).
pub fn encode_event(
    buffer: &mut [u8],
    control_index: usize,
    kind: EventKind,
    value: u16,
) -> Result<(), DecodeError> {
    let end = control_index
        .checked_mul(EVENT_SLOT_SIZE)
        .and_then(|start| start.checked_add(EVENT_SLOT_SIZE));
    let buffer_len = buffer.len();
    let slot = end
        .and_then(|end| buffer.get_mut(end - EVENT_SLOT_SIZE..end))
        .ok_or(DecodeError::OutOfRange {
            field: "event buffer",
            value: end.map_or(i64::MAX, |end| end as i64),
            limit: buffer_len as i64,
        })?;

    let [low, high] = value.to_le_bytes();
    slot[0] = slot[0].wrapping_add(1);
    slot[1] = kind.to_byte();
    slot[2] = low;
    slot[3] = high;
    Ok(())
}

// Peer-side encoders. The client never sends these blobs; they exist for
// simulated peers and round-trip checks.

/// Encode an int32 LE scalar attribute.
pub fn encode_scalar(value: i32) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

/// Encode control kinds, one byte each.
pub fn encode_control_kinds(kinds: &[ControlKind]) -> Bytes {
    kinds.iter().map(|k| k.to_byte()).collect::<Vec<_>>().into()
}

/// Encode cells into a `Frames` blob.
pub fn encode_frames(cells: &[ControlCell]) -> Bytes {
    let mut buf = BytesMut::with_capacity(cells.len() * FRAME_SIZE);
    for cell in cells {
        buf.put_slice(&[cell.left, cell.top, cell.width, cell.height]);
    }
    buf.freeze()
}

/// Encode configs into a `ConfigData` blob.
pub fn encode_configs(configs: &[ControlConfig]) -> Bytes {
    let mut buf = BytesMut::with_capacity(configs.len() * CONFIG_SIZE);
    for config in configs {
        buf.put_u16_le(config.data1);
        buf.put_u16_le(config.data2);
        buf.put_u16_le(config.data3);
        buf.put_u16_le(config.data4);
    }
    buf.freeze()
}

/// Encode labels into a `Names` blob.
pub fn encode_names<S: AsRef<str>>(names: &[S]) -> Bytes {
    let joined = names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    Bytes::from(joined)
}
