//! In-process simulated peer.
//!
//! [`SimulatedPeer`] describes what the remote device serves;
//! [`MemoryTransport`] implements [`Transport`] against it. On connect a
//! peer task is spawned that drains a bounded request queue, optionally
//! sleeping before each reply, and posts completions back through the
//! session handle, the same way a platform callback thread would.
//!
//! A full request queue rejects the request, which exercises the session's
//! defer-and-retry path. [`PeerLink`] lets the test or demo look at what the
//! peer received and pull the plug.
//!
//! # Example
//!
//! ```ignore
//! let peer = SimulatedPeer::new().with_panel(&panel).device_name("Kitchen");
//! let link = peer.link();
//! let (handle, task) = Session::builder(PeerId::new("sim"))
//!     .start_with(|handle| peer.into_transport(handle), renderer);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ConnectionState, PeerId, RequestStatus, Transport, TransportEvent};
use crate::error::TransportError;
use crate::protocol::{AttributeId, EventRecord, PanelDescriptor, EVENT_SLOT_SIZE};
use crate::session::SessionHandle;

/// Default depth of the peer's request queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Platform status reported for injected failures (GATT_ERROR).
pub const SIMULATED_FAILURE_STATUS: i32 = 257;

/// State shared between the transport, its peer task and [`PeerLink`]s.
#[derive(Debug, Default)]
struct PeerState {
    connected: bool,
    written_frames: Vec<Bytes>,
    reads_served: Vec<AttributeId>,
    rejected_requests: usize,
    notifier: Option<SessionHandle>,
}

#[derive(Debug, Default, Clone)]
struct Shared(Arc<Mutex<PeerState>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Description of a simulated remote device.
#[derive(Debug)]
pub struct SimulatedPeer {
    attributes: HashMap<AttributeId, Bytes>,
    latency: Duration,
    queue_depth: usize,
    read_failures: HashMap<AttributeId, u32>,
    write_failures: u32,
    refuse_connection: bool,
    shared: Shared,
}

impl Default for SimulatedPeer {
    fn default() -> Self {
        Self {
            attributes: HashMap::new(),
            latency: Duration::ZERO,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            read_failures: HashMap::new(),
            write_failures: 0,
            refuse_connection: false,
            shared: Shared::default(),
        }
    }
}

impl SimulatedPeer {
    /// A peer serving nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every descriptor attribute of `panel` plus a zeroed event channel.
    pub fn with_panel(mut self, panel: &PanelDescriptor) -> Self {
        self.attributes.extend(panel.to_attributes());
        self.attributes.insert(
            AttributeId::EventChannel,
            Bytes::from(vec![0u8; panel.control_count() * EVENT_SLOT_SIZE]),
        );
        self
    }

    /// Serve `value` for `id`, replacing any previous value.
    pub fn with_attribute(mut self, id: AttributeId, value: impl Into<Bytes>) -> Self {
        self.attributes.insert(id, value.into());
        self
    }

    /// Stop advertising `id` in discovery.
    pub fn without_attribute(mut self, id: AttributeId) -> Self {
        self.attributes.remove(&id);
        self
    }

    /// Advertise a GAP device name.
    pub fn device_name(self, name: &str) -> Self {
        self.with_attribute(AttributeId::DeviceName, Bytes::copy_from_slice(name.as_bytes()))
    }

    /// Delay before every reply.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of requests the peer buffers before rejecting. Minimum 1.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Fail the next `times` reads of `id`.
    pub fn fail_reads(mut self, id: AttributeId, times: u32) -> Self {
        self.read_failures.insert(id, times);
        self
    }

    /// Fail the next `times` writes.
    pub fn fail_writes(mut self, times: u32) -> Self {
        self.write_failures = times;
        self
    }

    /// Refuse every connection attempt.
    pub fn refuse_connection(mut self) -> Self {
        self.refuse_connection = true;
        self
    }

    /// Inspection handle, usable before and after the transport exists.
    pub fn link(&self) -> PeerLink {
        PeerLink {
            shared: self.shared.clone(),
        }
    }

    /// Build the transport. `notifier` receives every completion.
    pub fn into_transport(self, notifier: SessionHandle) -> MemoryTransport {
        self.shared.lock().notifier = Some(notifier.clone());
        MemoryTransport {
            shared: self.shared.clone(),
            peer: Some(self),
            notifier,
            requests: None,
            task: None,
        }
    }

    fn serve(&mut self, request: PeerRequest) -> TransportEvent {
        match request {
            PeerRequest::Connect => {
                self.shared.lock().connected = true;
                TransportEvent::Connection(ConnectionState::Connected)
            }
            PeerRequest::Discover => {
                TransportEvent::DiscoveryComplete(Ok(self.attributes.keys().copied().collect()))
            }
            PeerRequest::Read(id) => {
                let result = match self.read_failures.get_mut(&id) {
                    Some(remaining) if *remaining > 0 => {
                        *remaining -= 1;
                        Err(TransportError::ReadFailed {
                            attribute: id,
                            status: SIMULATED_FAILURE_STATUS,
                        })
                    }
                    _ => self.attributes.get(&id).cloned().ok_or(TransportError::ReadFailed {
                        attribute: id,
                        status: SIMULATED_FAILURE_STATUS,
                    }),
                };
                if result.is_ok() {
                    self.shared.lock().reads_served.push(id);
                }
                TransportEvent::AttributeRead { id, result }
            }
            PeerRequest::Write(id, value) => {
                if self.write_failures > 0 {
                    self.write_failures -= 1;
                    return TransportEvent::WriteComplete(Err(TransportError::WriteFailed {
                        status: SIMULATED_FAILURE_STATUS,
                    }));
                }
                if id == AttributeId::EventChannel {
                    self.shared.lock().written_frames.push(value.clone());
                }
                self.attributes.insert(id, value);
                TransportEvent::WriteComplete(Ok(()))
            }
        }
    }
}

#[derive(Debug)]
enum PeerRequest {
    Connect,
    Discover,
    Read(AttributeId),
    Write(AttributeId, Bytes),
}

/// [`Transport`] backed by a [`SimulatedPeer`] task.
#[derive(Debug)]
pub struct MemoryTransport {
    /// Moved into the peer task on connect.
    peer: Option<SimulatedPeer>,
    notifier: SessionHandle,
    shared: Shared,
    requests: Option<mpsc::Sender<PeerRequest>>,
    task: Option<JoinHandle<()>>,
}

impl MemoryTransport {
    fn submit(&mut self, request: PeerRequest) -> RequestStatus {
        let Some(requests) = &self.requests else {
            return RequestStatus::Rejected;
        };
        match requests.try_send(request) {
            Ok(()) => RequestStatus::Queued,
            Err(_) => {
                self.shared.lock().rejected_requests += 1;
                RequestStatus::Rejected
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, peer_id: &PeerId) -> Result<(), TransportError> {
        let peer = self
            .peer
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("transport already used".into()))?;
        if peer.refuse_connection {
            return Err(TransportError::ConnectFailed(format!(
                "{} refused the connection",
                peer_id
            )));
        }

        let (tx, rx) = mpsc::channel(peer.queue_depth);
        let task = tokio::spawn(peer_loop(peer, rx, self.notifier.clone()));
        self.requests = Some(tx);
        self.task = Some(task);

        match self.submit(PeerRequest::Connect) {
            RequestStatus::Queued => Ok(()),
            RequestStatus::Rejected => Err(TransportError::ConnectFailed(
                "peer request queue full".into(),
            )),
        }
    }

    fn discover_attributes(&mut self) -> Result<(), TransportError> {
        match self.submit(PeerRequest::Discover) {
            RequestStatus::Queued => Ok(()),
            RequestStatus::Rejected => Err(TransportError::DiscoveryFailed(
                "peer request queue full".into(),
            )),
        }
    }

    fn read_attribute(&mut self, id: AttributeId) -> RequestStatus {
        self.submit(PeerRequest::Read(id))
    }

    fn write_attribute(&mut self, id: AttributeId, value: Bytes) -> RequestStatus {
        self.submit(PeerRequest::Write(id, value))
    }

    fn disconnect(&mut self) {
        self.requests = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shared.lock().connected = false;
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Peer task: serve requests in order until the queue closes.
async fn peer_loop(
    mut peer: SimulatedPeer,
    mut requests: mpsc::Receiver<PeerRequest>,
    notifier: SessionHandle,
) {
    while let Some(request) = requests.recv().await {
        if !peer.latency.is_zero() {
            tokio::time::sleep(peer.latency).await;
        }

        let is_connect = matches!(request, PeerRequest::Connect);
        if !is_connect && !peer.shared.lock().connected {
            tracing::debug!("Peer offline, dropping {:?}", request);
            continue;
        }

        let event = peer.serve(request);
        if notifier.notify(event).is_err() {
            tracing::debug!("Session gone, stopping simulated peer");
            break;
        }
    }
}

/// Window into a simulated peer.
#[derive(Debug, Clone)]
pub struct PeerLink {
    shared: Shared,
}

impl PeerLink {
    /// Every event-channel frame the peer accepted, oldest first.
    pub fn written_frames(&self) -> Vec<Bytes> {
        self.shared.lock().written_frames.clone()
    }

    /// Decode `control_index`'s slot of the last written frame.
    pub fn last_event(&self, control_index: usize) -> Option<EventRecord> {
        let state = self.shared.lock();
        state
            .written_frames
            .last()
            .and_then(|frame| EventRecord::decode(frame, control_index))
    }

    /// Attributes served successfully, in serve order.
    pub fn reads_served(&self) -> Vec<AttributeId> {
        self.shared.lock().reads_served.clone()
    }

    /// Requests refused because the queue was full.
    pub fn rejected_requests(&self) -> usize {
        self.shared.lock().rejected_requests
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// Simulate the peer going out of range.
    pub fn drop_connection(&self) {
        let notifier = {
            let mut state = self.shared.lock();
            state.connected = false;
            state.notifier.clone()
        };
        if let Some(notifier) = notifier {
            let _ = notifier.notify(TransportEvent::Connection(ConnectionState::Disconnected));
        }
    }
}
