//! Panel assembler - turns independently arriving attribute blobs into one
//! validated [`PanelDescriptor`].
//!
//! Implements a state machine:
//! - `Collecting`: waiting for descriptor attributes (any order, any latency)
//! - `Complete`: a panel was assembled and is waiting to be taken
//! - `Consumed`: the panel was handed out
//! - `Failed`: the stored blobs were malformed; no panel will ever be produced
//!
//! A panel is all-or-nothing: a decode error anywhere aborts assembly and no
//! partial descriptor is exposed.
//!
//! # Example
//!
//! ```ignore
//! use lremote_client::PanelAssembler;
//!
//! let mut assembler = PanelAssembler::new("No Name");
//!
//! // Reads complete in whatever order the transport delivers them
//! for (id, blob) in arrivals {
//!     assembler.on_attribute_arrived(id, blob)?;
//! }
//!
//! if assembler.is_ready() {
//!     assembler.try_assemble()?;
//!     let panel = assembler.take()?;
//! }
//! ```

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;

use crate::error::{DecodeError, RemoteError, Result};
use crate::protocol::{
    decode_byte_at, decode_config, decode_control_count, decode_control_kind, decode_dimension,
    decode_frames, decode_names, decode_orientation, label_or_placeholder, AttributeId,
    ControlInfo, PanelDescriptor, DESCRIPTOR_ATTRIBUTES,
};

/// Placeholder label for controls without a name entry.
pub const DEFAULT_LABEL_PLACEHOLDER: &str = "No Name";

/// Assembler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerPhase {
    Collecting,
    Complete,
    Consumed,
    Failed,
}

#[derive(Debug)]
enum State {
    Collecting,
    Complete(PanelDescriptor),
    Consumed,
    Failed,
}

/// Accumulates descriptor attributes for one session.
#[derive(Debug)]
pub struct PanelAssembler {
    /// Stored blobs, one per descriptor attribute.
    blobs: HashMap<AttributeId, Bytes>,
    /// Descriptor attributes that have not arrived yet.
    outstanding: BTreeSet<AttributeId>,
    state: State,
    label_placeholder: String,
}

impl PanelAssembler {
    /// Create an assembler expecting the full descriptor attribute set.
    pub fn new(label_placeholder: impl Into<String>) -> Self {
        Self {
            blobs: HashMap::with_capacity(DESCRIPTOR_ATTRIBUTES.len()),
            outstanding: DESCRIPTOR_ATTRIBUTES.into_iter().collect(),
            state: State::Collecting,
            label_placeholder: label_placeholder.into(),
        }
    }

    /// Store an arrived blob and mark it as no longer outstanding.
    ///
    /// A second arrival of the same attribute replaces the first.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `id` is not a descriptor attribute or the assembler
    /// is no longer collecting.
    pub fn on_attribute_arrived(&mut self, id: AttributeId, bytes: Bytes) -> Result<()> {
        if !id.is_descriptor() {
            return Err(RemoteError::InvalidState(format!(
                "{} is not a descriptor attribute",
                id
            )));
        }
        if !matches!(self.state, State::Collecting) {
            return Err(RemoteError::InvalidState(format!(
                "{} arrived while assembler is {:?}",
                id,
                self.phase()
            )));
        }

        if self.blobs.insert(id, bytes).is_some() {
            tracing::debug!("Replacing previously stored {}", id);
        }
        self.outstanding.remove(&id);
        Ok(())
    }

    /// Whether every descriptor attribute has arrived.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Descriptor attributes still missing.
    pub fn outstanding(&self) -> impl Iterator<Item = AttributeId> + '_ {
        self.outstanding.iter().copied()
    }

    /// Current phase.
    pub fn phase(&self) -> AssemblerPhase {
        match self.state {
            State::Collecting => AssemblerPhase::Collecting,
            State::Complete(_) => AssemblerPhase::Complete,
            State::Consumed => AssemblerPhase::Consumed,
            State::Failed => AssemblerPhase::Failed,
        }
    }

    /// Decode all stored blobs into a panel.
    ///
    /// Returns a reference to the assembled panel; call [`take`](Self::take)
    /// to move it out.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if attributes are still outstanding or assembly was
    ///   already attempted
    /// - `Decode` if any blob is malformed (the assembler then stays `Failed`)
    pub fn try_assemble(&mut self) -> Result<&PanelDescriptor> {
        if !matches!(self.state, State::Collecting) {
            return Err(RemoteError::InvalidState(format!(
                "try_assemble called while assembler is {:?}",
                self.phase()
            )));
        }
        if !self.is_ready() {
            return Err(RemoteError::InvalidState(format!(
                "try_assemble called with outstanding attributes: {:?}",
                self.outstanding
            )));
        }

        match self.decode() {
            Ok(panel) => {
                tracing::debug!(
                    "Assembled panel: {}x{} grid, {} controls",
                    panel.columns,
                    panel.rows,
                    panel.control_count()
                );
                self.state = State::Complete(panel);
                self.blobs.clear();
                let State::Complete(panel) = &self.state else {
                    return Err(RemoteError::InvalidState(
                        "assembled panel was not stored".to_string(),
                    ));
                };
                Ok(panel)
            }
            Err(e) => {
                tracing::warn!("Panel assembly failed: {}", e);
                self.state = State::Failed;
                self.blobs.clear();
                Err(e.into())
            }
        }
    }

    /// Move the assembled panel out. `Complete -> Consumed`.
    pub fn take(&mut self) -> Result<PanelDescriptor> {
        match std::mem::replace(&mut self.state, State::Consumed) {
            State::Complete(panel) => Ok(panel),
            other => {
                self.state = other;
                Err(RemoteError::InvalidState(format!(
                    "no assembled panel to take (assembler is {:?})",
                    self.phase()
                )))
            }
        }
    }

    /// Stored blob, or an empty slice if it never arrived.
    fn blob(&self, id: AttributeId) -> &[u8] {
        self.blobs.get(&id).map(|b| &b[..]).unwrap_or_default()
    }

    /// Run the decoders in fixed order:
    /// count -> types -> colors -> frames -> config -> names -> grid.
    fn decode(&self) -> std::result::Result<PanelDescriptor, DecodeError> {
        let count = decode_control_count(self.blob(AttributeId::ControlCount))?;

        let types = self.blob(AttributeId::ControlTypes);
        if types.len() < count {
            return Err(DecodeError::OutOfRange {
                field: "control types",
                value: count as i64,
                limit: types.len() as i64,
            });
        }
        let kinds = types[..count]
            .iter()
            .map(|&b| decode_control_kind(b))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let colors = self.blob(AttributeId::Colors);
        let color_ids = (0..count)
            .map(|i| decode_byte_at("colors", colors, i))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let frames = self.blob(AttributeId::Frames);
        let cells = (0..count)
            .map(|i| decode_frames(frames, i))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let config_data = self.blob(AttributeId::ConfigData);
        let configs = (0..count)
            .map(|i| decode_config(config_data, i))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let names = decode_names(self.blob(AttributeId::Names));

        let rows = decode_dimension("rows", self.blob(AttributeId::Row))?;
        let columns = decode_dimension("columns", self.blob(AttributeId::Col))?;
        let is_landscape = decode_orientation(self.blob(AttributeId::Orientation))?;

        let controls = kinds
            .into_iter()
            .zip(color_ids)
            .zip(cells)
            .zip(configs)
            .enumerate()
            .map(|(index, (((kind, color_id), cell), config))| ControlInfo {
                index,
                kind,
                color_id,
                cell,
                config,
                label: label_or_placeholder(&names, index, &self.label_placeholder),
                render_handle: None,
            })
            .collect();

        let panel = PanelDescriptor {
            rows,
            columns,
            is_landscape,
            controls,
        };
        panel.validate()?;
        Ok(panel)
    }
}

impl Default for PanelAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL_PLACEHOLDER)
    }
}
