//! Rendering seam between the session and the UI layer.
//!
//! The session never draws anything. It reports the assembled panel, a
//! failure to produce one, and device-name updates through [`Renderer`].
//! Callbacks run on the session task and must not block.

use tokio::sync::mpsc;

use crate::error::RemoteError;
use crate::protocol::PanelDescriptor;

/// UI-facing notifications from a session.
pub trait Renderer: Send + 'static {
    /// The panel is complete and validated. Called at most once per session.
    fn on_panel_ready(&mut self, panel: PanelDescriptor);

    /// No panel will be produced. Called at most once per session, never
    /// after `on_panel_ready`.
    fn on_panel_unavailable(&mut self, error: &RemoteError);

    /// The peer's advertised name was read.
    fn on_device_name_updated(&mut self, name: &str);
}

/// Owned form of a [`Renderer`] callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    PanelReady(PanelDescriptor),
    PanelUnavailable(RemoteError),
    DeviceNameUpdated(String),
}

/// Renderer that forwards every callback into a channel.
///
/// Handy for UIs running on their own task, and for tests.
#[derive(Debug)]
pub struct ChannelRenderer {
    tx: mpsc::UnboundedSender<RenderEvent>,
}

impl ChannelRenderer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RenderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: RenderEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Render receiver dropped, discarding event");
        }
    }
}

impl Renderer for ChannelRenderer {
    fn on_panel_ready(&mut self, panel: PanelDescriptor) {
        self.forward(RenderEvent::PanelReady(panel));
    }

    fn on_panel_unavailable(&mut self, error: &RemoteError) {
        self.forward(RenderEvent::PanelUnavailable(error.clone()));
    }

    fn on_device_name_updated(&mut self, name: &str) {
        self.forward(RenderEvent::DeviceNameUpdated(name.to_string()));
    }
}
