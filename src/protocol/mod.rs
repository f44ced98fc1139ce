//! Protocol module - descriptor wire format, panel model and event records.
//!
//! Everything here is pure: no I/O, no session state.
//! - Attribute identifiers and characteristic UUIDs
//! - Decoders for the descriptor blobs (and peer-side encoders)
//! - The validated panel model
//! - The per-control event record

mod attribute;
mod event;
mod panel;
mod wire_format;

pub use attribute::{
    AttributeId, DESCRIPTOR_ATTRIBUTES, DEVICE_NAME_UUID, GAP_SERVICE_UUID, REMOTE_SERVICE_UUID,
};
pub use event::{EncodedFrame, EventRecord, OutgoingEvent};
pub use panel::{ControlCell, ControlConfig, ControlInfo, PanelDescriptor, RenderHandle};
pub use wire_format::{
    decode_byte_at, decode_config, decode_control_count, decode_control_kind, decode_device_name,
    decode_dimension,
    decode_frames, decode_names, decode_orientation, decode_scalar, encode_configs,
    encode_control_kinds, encode_event, encode_frames, encode_names, encode_scalar, event_codes,
    kind_codes, label_or_placeholder, ControlKind, EventKind, CONFIG_SIZE, EVENT_SLOT_SIZE,
    FRAME_SIZE, NAME_DELIMITER, SCALAR_SIZE,
};
