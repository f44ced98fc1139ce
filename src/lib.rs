//! # lremote-client
//!
//! Client core for LRemote: BLE peripherals that describe their own control
//! panel (buttons, sliders, switches, labels on a grid) and receive user
//! interactions as compact event records.
//!
//! ## Architecture
//!
//! - **Wire codec** ([`protocol`]): pure decoders for the descriptor
//!   attributes and the 4-byte event record
//! - **Panel assembler** ([`PanelAssembler`]): collects attribute blobs in
//!   any order and produces one validated [`PanelDescriptor`]
//! - **Event writer** ([`writer`]): owns the shared event buffer, one write in flight
//! - **Session** ([`Session`]): connect, discover, read, assemble, then
//!   stream events until disconnect
//!
//! The platform BLE stack plugs in through [`Transport`], the UI through
//! [`Renderer`].
//!
//! ## Example
//!
//! ```ignore
//! use lremote_client::{ChannelRenderer, EventKind, PeerId, RenderEvent, Session};
//!
//! #[tokio::main]
//! async fn main() -> lremote_client::Result<()> {
//!     let (renderer, mut ui) = ChannelRenderer::new();
//!     let (handle, task) = Session::builder(PeerId::new("C8:2B:96:00:11:22"))
//!         .start_with(|handle| PlatformTransport::new(handle), renderer);
//!
//!     while let Some(event) = ui.recv().await {
//!         if let RenderEvent::PanelReady(panel) = event {
//!             // draw it; on touch:
//!             handle.report_interaction(0, EventKind::ValueChange, 1)?;
//!         }
//!     }
//!     task.await.expect("session task panicked")
//! }
//! ```

pub mod assembler;
pub mod config;
pub mod error;
pub mod fanout;
pub mod protocol;
pub mod render;
pub mod session;
pub mod transport;
pub mod writer;

pub use assembler::{AssemblerPhase, PanelAssembler};
pub use config::SessionConfig;
pub use error::{DecodeError, RemoteError, Result, TransportError};
pub use protocol::{
    AttributeId, ControlCell, ControlConfig, ControlInfo, ControlKind, EventKind, OutgoingEvent,
    PanelDescriptor, RenderHandle,
};
pub use render::{ChannelRenderer, RenderEvent, Renderer};
pub use session::{Session, SessionBuilder, SessionHandle, SessionState};
pub use transport::{ConnectionState, PeerId, RequestStatus, Transport, TransportEvent};
