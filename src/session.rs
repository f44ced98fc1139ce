//! Session controller and runtime loop.
//!
//! A [`Session`] owns everything tied to one connection: the panel
//! assembler, the read fan-out, the assembled panel and the event writer.
//! It runs as a single task that processes one message at a time,
//! so none of that state is ever touched from two contexts.
//!
//! ```text
//! Idle ─► Connecting ─► DiscoveringServices ─► ReadingAttributes ─► Ready
//!             │                 │                      │              │
//!             └─────────────────┴──── disconnect ──────┴──────────────┴─► Terminated
//! ```
//!
//! The outside world talks to the session through a cloneable
//! [`SessionHandle`]: the transport reports completions with
//! [`SessionHandle::notify`], the UI reports interactions with
//! [`SessionHandle::report_interaction`].
//!
//! # Example
//!
//! ```ignore
//! use lremote_client::{ChannelRenderer, PeerId, Session};
//!
//! let (renderer, mut ui_events) = ChannelRenderer::new();
//! let (handle, task) = Session::builder(PeerId::new("AA:BB:CC:DD:EE:FF"))
//!     .read_retry_limit(5)
//!     .start_with(|handle| MyBleTransport::new(handle), renderer);
//!
//! while let Some(event) = ui_events.recv().await {
//!     // draw the panel, then forward touches:
//!     // handle.report_interaction(index, EventKind::ValueChange, value)?;
//! }
//! task.await??;
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::assembler::PanelAssembler;
use crate::config::SessionConfig;
use crate::error::{RemoteError, Result, TransportError};
use crate::fanout::ReadFanout;
use crate::protocol::{
    decode_device_name, AttributeId, ControlKind, EventKind, OutgoingEvent, PanelDescriptor,
    DESCRIPTOR_ATTRIBUTES,
};
use crate::render::Renderer;
use crate::transport::{ConnectionState, PeerId, Transport, TransportEvent};
use crate::writer::{EventEncoder, EventWriter, WriteOutcome};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    DiscoveringServices,
    ReadingAttributes,
    Ready,
    Terminated,
}

/// Messages processed by the session loop.
#[derive(Debug)]
enum SessionMessage {
    Transport(TransportEvent),
    Interaction(OutgoingEvent),
    Shutdown,
}

/// What the handle needs to validate interactions without asking the session.
#[derive(Debug)]
struct PanelGate {
    kinds: Vec<ControlKind>,
    accepts_events: bool,
}

impl PanelGate {
    fn check(&self, event: &OutgoingEvent) -> Result<()> {
        let kind = *self
            .kinds
            .get(event.control_index)
            .ok_or(RemoteError::UnknownControl(event.control_index))?;
        if !kind.emits_events() {
            return Err(RemoteError::UnsupportedInteraction {
                index: event.control_index,
                kind,
            });
        }
        if !self.accepts_events {
            return Err(RemoteError::InvalidState(
                "peer exposes no event channel".into(),
            ));
        }
        Ok(())
    }
}

/// Release `n` pending interaction slots.
fn release(pending: &AtomicUsize, n: usize) {
    if n > 0 {
        let _ = pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            Some(current.saturating_sub(n))
        });
    }
}

/// Cloneable entry point into a running session.
///
/// Cheap to clone; every clone feeds the same session. All methods return
/// immediately.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMessage>,
    /// Interactions accepted but not yet delivered or dropped.
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    gate: Arc<OnceLock<PanelGate>>,
}

impl SessionHandle {
    /// Deliver a transport notification to the session.
    ///
    /// Safe to call from any thread, including platform callback threads.
    pub fn notify(&self, event: TransportEvent) -> Result<()> {
        self.tx
            .send(SessionMessage::Transport(event))
            .map_err(|_| RemoteError::SessionClosed)
    }

    /// Report a user interaction on a control.
    ///
    /// # Errors
    ///
    /// - `SessionClosed` once the session has terminated
    /// - `InvalidState` before the panel is ready, or if the peer has no event channel
    /// - `UnknownControl` / `UnsupportedInteraction` for a bad index or a label
    /// - `Busy` if too many interactions are still waiting to be written
    pub fn report_interaction(&self, control_index: usize, kind: EventKind, value: u16) -> Result<()> {
        self.report(OutgoingEvent::new(control_index, kind, value))
    }

    /// Report a prepared [`OutgoingEvent`].
    pub fn report(&self, event: OutgoingEvent) -> Result<()> {
        if self.tx.is_closed() {
            return Err(RemoteError::SessionClosed);
        }
        self.gate
            .get()
            .ok_or_else(|| RemoteError::InvalidState("panel is not ready".into()))?
            .check(&event)?;

        // Reserve a slot BEFORE sending
        let max = self.max_pending;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .map_err(|_| RemoteError::Busy)?;

        if self.tx.send(SessionMessage::Interaction(event)).is_err() {
            release(&self.pending, 1);
            return Err(RemoteError::SessionClosed);
        }
        Ok(())
    }

    /// Ask the session to disconnect and terminate.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionMessage::Shutdown);
    }

    /// Whether the session has terminated.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Interactions accepted but not yet delivered.
    #[inline]
    pub fn pending_interactions(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Builder for configuring and starting a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    peer: PeerId,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            config: SessionConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how many times a failed attribute read is retried.
    ///
    /// Default: 3
    pub fn read_retry_limit(mut self, limit: u32) -> Self {
        self.config.read_retry_limit = limit;
        self
    }

    /// Set how many times a failed event write is resent.
    ///
    /// Default: 2
    pub fn write_retry_limit(mut self, limit: u32) -> Self {
        self.config.write_retry_limit = limit;
        self
    }

    /// Set the period of the deferred read/write retry tick.
    ///
    /// Default: 250 ms
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Set the maximum number of undelivered interactions.
    ///
    /// Default: 64
    pub fn max_pending_interactions(mut self, limit: usize) -> Self {
        self.config.max_pending_interactions = limit;
        self
    }

    /// Set the label used for controls without a name.
    ///
    /// Default: "No Name"
    pub fn label_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.config.label_placeholder = placeholder.into();
        self
    }

    /// Build the session without starting it.
    ///
    /// `make_transport` receives the handle the transport must use to
    /// report completions.
    pub fn build<T, R, F>(self, make_transport: F, renderer: R) -> (Session<T, R>, SessionHandle)
    where
        T: Transport,
        R: Renderer,
        F: FnOnce(SessionHandle) -> T,
    {
        let (tx, inbox) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(OnceLock::new());
        let handle = SessionHandle {
            tx,
            pending: pending.clone(),
            max_pending: self.config.max_pending_interactions,
            gate: gate.clone(),
        };

        let transport = make_transport(handle.clone());
        let session = Session {
            assembler: PanelAssembler::new(self.config.label_placeholder.clone()),
            peer: self.peer,
            config: self.config,
            state: SessionState::Idle,
            transport,
            renderer,
            inbox,
            pending,
            gate,
            fanout: None,
            writer: None,
            panel: None,
            has_event_channel: false,
            device_name: None,
            outcome_reported: false,
        };
        (session, handle)
    }

    /// Build the session and spawn its loop on the current tokio runtime.
    pub fn start_with<T, R, F>(self, make_transport: F, renderer: R) -> (SessionHandle, JoinHandle<Result<()>>)
    where
        T: Transport,
        R: Renderer,
        F: FnOnce(SessionHandle) -> T,
    {
        let (session, handle) = self.build(make_transport, renderer);
        let task = tokio::spawn(session.run());
        (handle, task)
    }
}

/// One connection to one peer. Not reusable once terminated.
pub struct Session<T, R> {
    peer: PeerId,
    config: SessionConfig,
    state: SessionState,
    transport: T,
    renderer: R,
    inbox: mpsc::UnboundedReceiver<SessionMessage>,
    pending: Arc<AtomicUsize>,
    gate: Arc<OnceLock<PanelGate>>,
    assembler: PanelAssembler,
    fanout: Option<ReadFanout>,
    writer: Option<EventWriter>,
    panel: Option<PanelDescriptor>,
    has_event_channel: bool,
    device_name: Option<String>,
    /// Set once the renderer has been told ready or unavailable.
    outcome_reported: bool,
}

impl Session<(), ()> {
    /// Create a new session builder.
    pub fn builder(peer: PeerId) -> SessionBuilder {
        SessionBuilder::new(peer)
    }
}

impl<T: Transport, R: Renderer> Session<T, R> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// The assembled panel, once ready.
    pub fn panel(&self) -> Option<&PanelDescriptor> {
        self.panel.as_ref()
    }

    /// Last non-empty device name read from the peer.
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the session until it terminates.
    ///
    /// Returns `Ok(())` on disconnect or shutdown, and the fatal error when
    /// the peer could not be rendered.
    pub async fn run(mut self) -> Result<()> {
        if let Err(e) = self.start() {
            return Err(self.fail(e));
        }

        let mut retry = tokio::time::interval(self.config.effective_retry_interval());
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        retry.tick().await;

        while self.state != SessionState::Terminated {
            tokio::select! {
                message = self.inbox.recv() => {
                    let result = match message {
                        Some(SessionMessage::Transport(event)) => self.on_transport_event(event),
                        Some(SessionMessage::Interaction(event)) => {
                            self.on_interaction(event);
                            Ok(())
                        }
                        Some(SessionMessage::Shutdown) | None => {
                            self.teardown(RemoteError::SessionClosed);
                            Ok(())
                        }
                    };
                    if let Err(e) = result {
                        return Err(self.fail(e));
                    }
                }
                _ = retry.tick() => self.on_retry_tick(),
            }
        }

        tracing::debug!("Session with {} finished", self.peer);
        Ok(())
    }

    /// Leave `Idle` and ask the transport to connect.
    fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(RemoteError::InvalidState(format!(
                "cannot start a session in state {:?}",
                self.state
            )));
        }
        tracing::info!("Connecting to {}", self.peer);
        self.state = SessionState::Connecting;
        self.transport.connect(&self.peer)?;
        Ok(())
    }

    /// Process one transport notification. An error is fatal to the session.
    fn on_transport_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Connection(ConnectionState::Connected) => self.on_connected(),
            TransportEvent::Connection(ConnectionState::Disconnected) => {
                tracing::info!("Peer {} disconnected", self.peer);
                self.teardown(RemoteError::Transport(TransportError::Disconnected));
                Ok(())
            }
            TransportEvent::DiscoveryComplete(result) => self.on_discovery(result),
            TransportEvent::AttributeRead { id, result } => self.on_attribute_read(id, result),
            TransportEvent::WriteComplete(result) => {
                self.on_write_complete(result);
                Ok(())
            }
        }
    }

    fn on_connected(&mut self) -> Result<()> {
        if self.state != SessionState::Connecting {
            tracing::warn!("Ignoring connect notification in state {:?}", self.state);
            return Ok(());
        }
        tracing::debug!("Connected to {}, discovering attributes", self.peer);
        self.state = SessionState::DiscoveringServices;
        self.transport.discover_attributes()?;
        Ok(())
    }

    fn on_discovery(
        &mut self,
        result: std::result::Result<HashSet<AttributeId>, TransportError>,
    ) -> Result<()> {
        if self.state != SessionState::DiscoveringServices {
            tracing::warn!("Ignoring discovery result in state {:?}", self.state);
            return Ok(());
        }
        let available = result?;

        let missing: Vec<AttributeId> = DESCRIPTOR_ATTRIBUTES
            .into_iter()
            .filter(|id| !available.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(RemoteError::MissingAttributes(missing));
        }

        self.has_event_channel = available.contains(&AttributeId::EventChannel);
        if !self.has_event_channel {
            tracing::warn!("Peer {} has no event channel, interactions will be rejected", self.peer);
        }

        let mut targets = DESCRIPTOR_ATTRIBUTES.to_vec();
        if available.contains(&AttributeId::DeviceName) {
            targets.push(AttributeId::DeviceName);
        }

        let mut fanout = ReadFanout::new(targets, self.config.read_retry_limit);
        self.state = SessionState::ReadingAttributes;
        let issued = fanout.issue(&mut self.transport);
        tracing::debug!(
            "Issued {} attribute reads, {} deferred",
            issued,
            fanout.deferred_count()
        );
        self.fanout = Some(fanout);
        Ok(())
    }

    fn on_attribute_read(
        &mut self,
        id: AttributeId,
        result: std::result::Result<Bytes, TransportError>,
    ) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::ReadingAttributes | SessionState::Ready
        ) {
            tracing::debug!("Ignoring read of {} in state {:?}", id, self.state);
            return Ok(());
        }
        let Some(fanout) = self.fanout.as_mut() else {
            return Ok(());
        };

        match result {
            Ok(bytes) => {
                if !fanout.on_arrival(id) {
                    tracing::debug!("Unsolicited read of {}", id);
                }
                if id == AttributeId::DeviceName {
                    self.update_device_name(&bytes);
                } else if id.is_descriptor() && self.state == SessionState::ReadingAttributes {
                    self.assembler.on_attribute_arrived(id, bytes)?;
                } else {
                    tracing::debug!("Dropping read of {} after assembly", id);
                }
            }
            Err(e) => match fanout.on_failure(id, e) {
                Ok(()) => {}
                Err(e) if id == AttributeId::DeviceName => {
                    tracing::warn!("Giving up on device name: {}", e);
                }
                Err(e) => return Err(e.into()),
            },
        }

        // A completion frees a transport slot for deferred reads
        if let Some(fanout) = self.fanout.as_mut() {
            fanout.issue(&mut self.transport);
        }

        if self.state == SessionState::ReadingAttributes && self.assembler.is_ready() {
            self.finish_assembly()?;
        }
        Ok(())
    }

    fn finish_assembly(&mut self) -> Result<()> {
        self.assembler.try_assemble()?;
        let panel = self.assembler.take()?;

        let gate = PanelGate {
            kinds: panel.controls.iter().map(|c| c.kind).collect(),
            accepts_events: self.has_event_channel,
        };
        if self.gate.set(gate).is_err() {
            return Err(RemoteError::InvalidState("panel assembled twice".into()));
        }
        if self.has_event_channel {
            let encoder = EventEncoder::new(panel.control_count());
            self.writer = Some(EventWriter::new(encoder, self.config.write_retry_limit));
        }

        tracing::info!(
            "Panel ready: {} controls on a {}x{} grid",
            panel.control_count(),
            panel.columns,
            panel.rows
        );
        self.state = SessionState::Ready;
        self.outcome_reported = true;
        self.renderer.on_panel_ready(panel.clone());
        self.panel = Some(panel);
        Ok(())
    }

    fn update_device_name(&mut self, bytes: &[u8]) {
        match decode_device_name(bytes) {
            Some(name) => {
                tracing::debug!("Device name: {}", name);
                self.renderer.on_device_name_updated(&name);
                self.device_name = Some(name);
            }
            None => tracing::debug!("Ignoring empty device name"),
        }
    }

    fn on_write_complete(&mut self, result: std::result::Result<(), TransportError>) {
        let Some(writer) = self.writer.as_mut() else {
            tracing::debug!("Ignoring write completion without an event writer");
            return;
        };

        match writer.on_write_complete(result) {
            WriteOutcome::Delivered | WriteOutcome::Abandoned(_) => release(&self.pending, 1),
            WriteOutcome::Retrying | WriteOutcome::Unexpected => {}
        }
        let dropped = writer.pump(&mut self.transport);
        release(&self.pending, dropped);
    }

    fn on_interaction(&mut self, event: OutgoingEvent) {
        if let Err(e) = self.accept_interaction(event) {
            tracing::warn!(
                "Rejected interaction on control {}: {}",
                event.control_index,
                e
            );
            release(&self.pending, 1);
        }
    }

    fn accept_interaction(&mut self, event: OutgoingEvent) -> Result<()> {
        if self.state != SessionState::Ready {
            return Err(RemoteError::InvalidState(format!(
                "interaction in state {:?}",
                self.state
            )));
        }
        let panel = self
            .panel
            .as_ref()
            .ok_or_else(|| RemoteError::InvalidState("no panel".into()))?;
        let control = panel
            .control(event.control_index)
            .ok_or(RemoteError::UnknownControl(event.control_index))?;
        if !control.emits_events() {
            return Err(RemoteError::UnsupportedInteraction {
                index: control.index,
                kind: control.kind,
            });
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RemoteError::InvalidState("peer exposes no event channel".into()))?;
        writer.enqueue(event);
        let dropped = writer.pump(&mut self.transport);
        release(&self.pending, dropped);
        Ok(())
    }

    /// Re-issue deferred reads and writes that no completion has unblocked.
    fn on_retry_tick(&mut self) {
        if !matches!(
            self.state,
            SessionState::ReadingAttributes | SessionState::Ready
        ) {
            return;
        }
        if let Some(fanout) = self.fanout.as_mut() {
            if fanout.has_deferred() {
                fanout.issue(&mut self.transport);
            }
        }
        if let Some(writer) = self.writer.as_mut() {
            let dropped = writer.pump(&mut self.transport);
            release(&self.pending, dropped);
        }
    }

    /// Terminate after a fatal error. Returns the error for the caller.
    fn fail(&mut self, error: RemoteError) -> RemoteError {
        tracing::error!("Session with {} failed: {}", self.peer, error);
        self.report_unavailable(&error);
        self.transport.disconnect();
        self.discard_state();
        error
    }

    /// Terminate on disconnect or shutdown.
    fn teardown(&mut self, reason: RemoteError) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.report_unavailable(&reason);
        self.transport.disconnect();
        self.discard_state();
    }

    fn report_unavailable(&mut self, error: &RemoteError) {
        if !self.outcome_reported {
            self.outcome_reported = true;
            self.renderer.on_panel_unavailable(error);
        }
    }

    /// Drop every piece of per-connection state and close the inbox.
    fn discard_state(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let discarded = writer.discard();
            if discarded > 0 {
                tracing::debug!("Discarded {} undelivered events", discarded);
            }
            release(&self.pending, discarded);
        }
        if let Some(mut fanout) = self.fanout.take() {
            let abandoned = fanout.clear();
            if abandoned > 0 {
                tracing::debug!("Abandoned {} outstanding reads", abandoned);
            }
        }
        self.assembler = PanelAssembler::new(self.config.label_placeholder.clone());
        self.panel = None;
        self.device_name = None;
        self.state = SessionState::Terminated;
        self.inbox.close();
    }
}
