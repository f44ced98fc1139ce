//! Attribute identifiers and their characteristic UUIDs.
//!
//! Every piece of the panel descriptor lives in its own characteristic of the
//! remote-control service. The device name comes from the standard GAP
//! service instead.
//!
//! ```text
//! 3f60ab39-1710-...  Remote-control service
//!          -1711     ControlCount   int32 LE
//!          -1712     ControlTypes   u8 per control
//!          -1713     Row            int32 LE
//!          -1714     Col            int32 LE
//!          -1715     Colors         u8 per control
//!          -1716     Frames         4 x u8 per control
//!          -1717     Names          '\n'-separated UTF-8
//!          -1718     EventChannel   4 x u8 per control (written)
//!          -1719     ConfigData     4 x u16 LE per control
//!          -171a     Orientation    int32 LE
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Remote-control GATT service.
pub const REMOTE_SERVICE_UUID: Uuid = Uuid::from_u128(0x3f60ab39_1710_4456_930c_7e9c9539917e);

/// Generic Access Profile service (holds the device name).
pub const GAP_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);

/// GAP device-name characteristic.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);

const fn remote_uuid(suffix: u16) -> Uuid {
    Uuid::from_u128(0x3f60ab39_0000_4456_930c_7e9c9539917e | ((suffix as u128) << 80))
}

/// Well-known attribute identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeId {
    Row,
    Col,
    Orientation,
    ControlCount,
    ControlTypes,
    Colors,
    Frames,
    ConfigData,
    Names,
    DeviceName,
    EventChannel,
}

/// Attributes that must all arrive before a panel can be assembled.
pub const DESCRIPTOR_ATTRIBUTES: [AttributeId; 9] = [
    AttributeId::Row,
    AttributeId::Col,
    AttributeId::Orientation,
    AttributeId::ControlCount,
    AttributeId::ControlTypes,
    AttributeId::Colors,
    AttributeId::Frames,
    AttributeId::ConfigData,
    AttributeId::Names,
];

impl AttributeId {
    /// Every identifier, descriptor attributes first.
    pub const ALL: [AttributeId; 11] = [
        AttributeId::Row,
        AttributeId::Col,
        AttributeId::Orientation,
        AttributeId::ControlCount,
        AttributeId::ControlTypes,
        AttributeId::Colors,
        AttributeId::Frames,
        AttributeId::ConfigData,
        AttributeId::Names,
        AttributeId::DeviceName,
        AttributeId::EventChannel,
    ];

    /// Characteristic UUID for this attribute.
    pub const fn uuid(self) -> Uuid {
        match self {
            AttributeId::ControlCount => remote_uuid(0x1711),
            AttributeId::ControlTypes => remote_uuid(0x1712),
            AttributeId::Row => remote_uuid(0x1713),
            AttributeId::Col => remote_uuid(0x1714),
            AttributeId::Colors => remote_uuid(0x1715),
            AttributeId::Frames => remote_uuid(0x1716),
            AttributeId::Names => remote_uuid(0x1717),
            AttributeId::EventChannel => remote_uuid(0x1718),
            AttributeId::ConfigData => remote_uuid(0x1719),
            AttributeId::Orientation => remote_uuid(0x171a),
            AttributeId::DeviceName => DEVICE_NAME_UUID,
        }
    }

    /// Map a discovered characteristic UUID back to an identifier.
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.uuid() == uuid)
    }

    /// Whether this attribute gates panel assembly.
    #[inline]
    pub fn is_descriptor(self) -> bool {
        !matches!(self, AttributeId::DeviceName | AttributeId::EventChannel)
    }

    /// Service the characteristic belongs to.
    pub fn service(self) -> Uuid {
        match self {
            AttributeId::DeviceName => GAP_SERVICE_UUID,
            _ => REMOTE_SERVICE_UUID,
        }
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_layout() {
        assert_eq!(
            AttributeId::ControlCount.uuid().to_string(),
            "3f60ab39-1711-4456-930c-7e9c9539917e"
        );
        assert_eq!(
            AttributeId::Orientation.uuid().to_string(),
            "3f60ab39-171a-4456-930c-7e9c9539917e"
        );
        assert_eq!(
            REMOTE_SERVICE_UUID.to_string(),
            "3f60ab39-1710-4456-930c-7e9c9539917e"
        );
        assert_eq!(
            AttributeId::DeviceName.uuid().to_string(),
            "00002a00-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_uuids_unique_and_reversible() {
        let uuids: HashSet<_> = AttributeId::ALL.iter().map(|id| id.uuid()).collect();
        assert_eq!(uuids.len(), AttributeId::ALL.len());

        for id in AttributeId::ALL {
            assert_eq!(AttributeId::from_uuid(id.uuid()), Some(id));
        }
        assert_eq!(AttributeId::from_uuid(REMOTE_SERVICE_UUID), None);
    }

    #[test]
    fn test_descriptor_set() {
        assert!(DESCRIPTOR_ATTRIBUTES.iter().all(|id| id.is_descriptor()));
        assert!(!AttributeId::DeviceName.is_descriptor());
        assert!(!AttributeId::EventChannel.is_descriptor());
        assert_eq!(AttributeId::DeviceName.service(), GAP_SERVICE_UUID);
        assert_eq!(AttributeId::Frames.service(), REMOTE_SERVICE_UUID);
    }
}
