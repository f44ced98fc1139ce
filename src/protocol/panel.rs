//! In-memory panel model produced by the assembler.
//!
//! Geometry is kept in grid-cell units. Converting cells to pixels is the
//! renderer's business.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::attribute::AttributeId;
use super::wire_format::{
    encode_configs, encode_control_kinds, encode_frames, encode_names, encode_scalar, ControlKind,
};
use crate::error::{DecodeError, RemoteError, Result};

/// Rectangle in grid-cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ControlCell {
    pub left: u8,
    pub top: u8,
    pub width: u8,
    pub height: u8,
}

impl ControlCell {
    pub fn new(left: u8, top: u8, width: u8, height: u8) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> u16 {
        u16::from(self.left) + u16::from(self.width)
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> u16 {
        u16::from(self.top) + u16::from(self.height)
    }

    /// Check the cell lies inside a `columns` x `rows` grid.
    pub fn check_within(&self, columns: u32, rows: u32) -> std::result::Result<(), DecodeError> {
        if u32::from(self.left) >= columns {
            return Err(DecodeError::OutOfRange {
                field: "cell left",
                value: i64::from(self.left),
                limit: i64::from(columns),
            });
        }
        if u32::from(self.top) >= rows {
            return Err(DecodeError::OutOfRange {
                field: "cell top",
                value: i64::from(self.top),
                limit: i64::from(rows),
            });
        }
        if u32::from(self.right()) > columns {
            return Err(DecodeError::OutOfRange {
                field: "cell right edge",
                value: i64::from(self.right()),
                limit: i64::from(columns),
            });
        }
        if u32::from(self.bottom()) > rows {
            return Err(DecodeError::OutOfRange {
                field: "cell bottom edge",
                value: i64::from(self.bottom()),
                limit: i64::from(rows),
            });
        }
        Ok(())
    }
}

/// Four kind-dependent configuration words.
///
/// For [`ControlKind::Slider`]: `data1` = min, `data2` = max,
/// `data3` = initial value, `data4` unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    pub data1: u16,
    pub data2: u16,
    pub data3: u16,
    pub data4: u16,
}

impl ControlConfig {
    pub fn new(data1: u16, data2: u16, data3: u16, data4: u16) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Slider minimum.
    #[inline]
    pub fn slider_min(&self) -> u16 {
        self.data1
    }

    /// Slider maximum.
    #[inline]
    pub fn slider_max(&self) -> u16 {
        self.data2
    }

    /// Slider value at construction time.
    #[inline]
    pub fn slider_initial(&self) -> u16 {
        self.data3
    }
}

/// Opaque widget identity owned by the renderer.
///
/// The core only stores it and hands it back; it never implies a lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderHandle(pub u64);

/// One control of the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlInfo {
    /// Position in the descriptor; also the event slot address.
    pub index: usize,
    pub kind: ControlKind,
    /// Small integer mapped to a display color by the renderer.
    pub color_id: u8,
    pub cell: ControlCell,
    pub config: ControlConfig,
    pub label: String,
    #[serde(skip)]
    pub render_handle: Option<RenderHandle>,
}

impl ControlInfo {
    /// Whether user interaction with this control produces events.
    #[inline]
    pub fn emits_events(&self) -> bool {
        self.kind.emits_events()
    }
}

/// A validated, complete control panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelDescriptor {
    pub rows: u32,
    pub columns: u32,
    pub is_landscape: bool,
    pub controls: Vec<ControlInfo>,
}

impl PanelDescriptor {
    /// Number of controls.
    #[inline]
    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// Look up a control by index.
    pub fn control(&self, index: usize) -> Option<&ControlInfo> {
        self.controls.get(index)
    }

    /// Check every structural invariant of a descriptor.
    ///
    /// - grid dimensions are positive
    /// - `controls[i].index == i`
    /// - every cell lies inside the grid
    pub fn validate(&self) -> std::result::Result<(), DecodeError> {
        if self.rows == 0 {
            return Err(DecodeError::OutOfRange {
                field: "rows",
                value: 0,
                limit: 1,
            });
        }
        if self.columns == 0 {
            return Err(DecodeError::OutOfRange {
                field: "columns",
                value: 0,
                limit: 1,
            });
        }
        for (position, control) in self.controls.iter().enumerate() {
            if control.index != position {
                return Err(DecodeError::OutOfRange {
                    field: "control index",
                    value: control.index as i64,
                    limit: position as i64,
                });
            }
            control.cell.check_within(self.columns, self.rows)?;
        }
        Ok(())
    }

    /// Associate a renderer widget with a control.
    pub fn attach_render_handle(&mut self, index: usize, handle: RenderHandle) -> Result<()> {
        let control = self
            .controls
            .get_mut(index)
            .ok_or(RemoteError::UnknownControl(index))?;
        control.render_handle = Some(handle);
        Ok(())
    }

    /// Find the control a renderer widget was attached to.
    pub fn control_for_handle(&self, handle: RenderHandle) -> Option<&ControlInfo> {
        self.controls
            .iter()
            .find(|c| c.render_handle == Some(handle))
    }

    /// Encode this panel into the attribute blobs a peer would serve.
    pub fn to_attributes(&self) -> HashMap<AttributeId, Bytes> {
        let count = self.controls.len();
        let kinds: Vec<ControlKind> = self.controls.iter().map(|c| c.kind).collect();
        let colors: Vec<u8> = self.controls.iter().map(|c| c.color_id).collect();
        let cells: Vec<ControlCell> = self.controls.iter().map(|c| c.cell).collect();
        let configs: Vec<ControlConfig> = self.controls.iter().map(|c| c.config).collect();
        let labels: Vec<&str> = self.controls.iter().map(|c| c.label.as_str()).collect();

        HashMap::from([
            (AttributeId::Row, encode_scalar(self.rows as i32)),
            (AttributeId::Col, encode_scalar(self.columns as i32)),
            (
                AttributeId::Orientation,
                encode_scalar(i32::from(self.is_landscape)),
            ),
            (AttributeId::ControlCount, encode_scalar(count as i32)),
            (AttributeId::ControlTypes, encode_control_kinds(&kinds)),
            (AttributeId::Colors, Bytes::from(colors)),
            (AttributeId::Frames, encode_frames(&cells)),
            (AttributeId::ConfigData, encode_configs(&configs)),
            (AttributeId::Names, encode_names(&labels)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(index: usize, kind: ControlKind, cell: ControlCell) -> ControlInfo {
        ControlInfo {
            index,
            kind,
            color_id: 1,
            cell,
            config: ControlConfig::default(),
            label: format!("c{}", index),
            render_handle: None,
        }
    }

    fn panel() -> PanelDescriptor {
        PanelDescriptor {
            rows: 2,
            columns: 4,
            is_landscape: false,
            controls: vec![
                control(0, ControlKind::PushButton, ControlCell::new(0, 0, 2, 1)),
                control(1, ControlKind::Slider, ControlCell::new(2, 0, 2, 1)),
            ],
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(panel().validate().is_ok());
    }

    #[test]
    fn test_cell_on_grid_edge_is_inside() {
        let cell = ControlCell::new(3, 1, 1, 1);
        assert!(cell.check_within(4, 2).is_ok());
    }

    #[test]
    fn test_zero_size_cell_on_edge_rejected() {
        assert_eq!(
            ControlCell::new(4, 0, 0, 1).check_within(4, 2),
            Err(DecodeError::OutOfRange {
                field: "cell left",
                value: 4,
                limit: 4,
            })
        );
        assert_eq!(
            ControlCell::new(0, 2, 1, 0).check_within(4, 2),
            Err(DecodeError::OutOfRange {
                field: "cell top",
                value: 2,
                limit: 2,
            })
        );
        assert!(ControlCell::new(3, 1, 0, 0).check_within(4, 2).is_ok());
    }

    #[test]
    fn test_cell_past_right_edge_rejected() {
        let mut p = panel();
        p.controls[1].cell = ControlCell::new(3, 0, 2, 1);
        assert_eq!(
            p.validate(),
            Err(DecodeError::OutOfRange {
                field: "cell right edge",
                value: 5,
                limit: 4
            })
        );
    }

    #[test]
    fn test_cell_past_bottom_edge_rejected() {
        let mut p = panel();
        p.controls[0].cell = ControlCell::new(0, 1, 1, 2);
        assert!(matches!(
            p.validate(),
            Err(DecodeError::OutOfRange {
                field: "cell bottom edge",
                ..
            })
        ));
    }

    #[test]
    fn test_index_mismatch_rejected() {
        let mut p = panel();
        p.controls[1].index = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_zero_rows_rejected() {
        let mut p = panel();
        p.rows = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_render_handle_association() {
        let mut p = panel();
        p.attach_render_handle(1, RenderHandle(77)).unwrap();

        let found = p.control_for_handle(RenderHandle(77)).unwrap();
        assert_eq!(found.index, 1);
        assert!(p.control_for_handle(RenderHandle(78)).is_none());

        let err = p.attach_render_handle(9, RenderHandle(1)).unwrap_err();
        assert_eq!(err, RemoteError::UnknownControl(9));
    }

    #[test]
    fn test_slider_accessors() {
        let config = ControlConfig::new(0, 100, 50, 0);
        assert_eq!(config.slider_min(), 0);
        assert_eq!(config.slider_max(), 100);
        assert_eq!(config.slider_initial(), 50);
    }

    #[test]
    fn test_serialize_skips_render_handle() {
        let mut p = panel();
        p.attach_render_handle(0, RenderHandle(5)).unwrap();

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["columns"], 4);
        assert_eq!(json["controls"][1]["kind"], "Slider");
        assert!(json["controls"][0].get("render_handle").is_none());
    }
}
