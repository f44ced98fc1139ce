//! Integration tests for lremote-client.
//!
//! Full sessions against the in-memory simulated peer: the session task,
//! the peer task and the renderer channel all run on the test runtime.

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use lremote_client::transport::memory::{PeerLink, SimulatedPeer, SIMULATED_FAILURE_STATUS};
use lremote_client::{
    AttributeId, ChannelRenderer, ControlCell, ControlConfig, ControlInfo, ControlKind,
    DecodeError, EventKind, OutgoingEvent, PanelDescriptor, PeerId, RemoteError, RenderEvent,
    Session, SessionBuilder, SessionConfig, SessionHandle, TransportError,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    handle: SessionHandle,
    task: JoinHandle<lremote_client::Result<()>>,
    ui: UnboundedReceiver<RenderEvent>,
    link: PeerLink,
}

impl Harness {
    fn start(peer: SimulatedPeer, builder: SessionBuilder) -> Self {
        let link = peer.link();
        let (renderer, ui) = ChannelRenderer::new();
        let (handle, task) = builder.start_with(|handle| peer.into_transport(handle), renderer);
        Self {
            handle,
            task,
            ui,
            link,
        }
    }

    fn with_defaults(peer: SimulatedPeer) -> Self {
        Self::start(peer, Session::builder(PeerId::new("sim-peer")))
    }

    async fn next_event(&mut self) -> RenderEvent {
        timeout(WAIT, self.ui.recv())
            .await
            .expect("timed out waiting for a render event")
            .expect("renderer channel closed")
    }

    async fn expect_ready(&mut self) -> PanelDescriptor {
        loop {
            match self.next_event().await {
                RenderEvent::PanelReady(panel) => return panel,
                RenderEvent::DeviceNameUpdated(_) => continue,
                RenderEvent::PanelUnavailable(e) => panic!("panel unavailable: {e}"),
            }
        }
    }

    async fn expect_unavailable(&mut self) -> RemoteError {
        loop {
            match self.next_event().await {
                RenderEvent::PanelUnavailable(e) => return e,
                RenderEvent::DeviceNameUpdated(_) => continue,
                RenderEvent::PanelReady(_) => panic!("panel unexpectedly ready"),
            }
        }
    }

    async fn finish(self) -> lremote_client::Result<()> {
        timeout(WAIT, self.task)
            .await
            .expect("session did not terminate")
            .expect("session task panicked")
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn control(index: usize, kind: ControlKind, cell: ControlCell, config: ControlConfig, label: &str) -> ControlInfo {
    ControlInfo {
        index,
        kind,
        color_id: index as u8 + 1,
        cell,
        config,
        label: label.into(),
        render_handle: None,
    }
}

/// Push button and slider side by side on a 4x2 grid.
fn reference_panel() -> PanelDescriptor {
    PanelDescriptor {
        rows: 2,
        columns: 4,
        is_landscape: false,
        controls: vec![
            control(0, ControlKind::PushButton, ControlCell::new(0, 0, 2, 1), ControlConfig::default(), "A"),
            control(1, ControlKind::Slider, ControlCell::new(2, 0, 2, 1), ControlConfig::new(0, 100, 50, 0), "B"),
        ],
    }
}

/// A larger landscape panel with one of every control kind.
fn mixed_panel() -> PanelDescriptor {
    PanelDescriptor {
        rows: 3,
        columns: 5,
        is_landscape: true,
        controls: vec![
            control(0, ControlKind::Label, ControlCell::new(0, 0, 5, 1), ControlConfig::default(), "Garage"),
            control(1, ControlKind::PushButton, ControlCell::new(0, 1, 1, 1), ControlConfig::default(), "Open"),
            control(2, ControlKind::CircleButton, ControlCell::new(1, 1, 1, 1), ControlConfig::default(), "Stop"),
            control(3, ControlKind::SwitchButton, ControlCell::new(2, 1, 3, 1), ControlConfig::default(), "Light"),
            control(4, ControlKind::Slider, ControlCell::new(0, 2, 5, 1), ControlConfig::new(10, 500, 250, 0), "Speed"),
        ],
    }
}

#[tokio::test]
async fn test_reference_panel_end_to_end() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .device_name("Kitchen");
    let mut harness = Harness::with_defaults(peer);

    let mut events = vec![harness.next_event().await, harness.next_event().await];
    events.sort_by_key(|e| matches!(e, RenderEvent::PanelReady(_)));

    assert_eq!(events[0], RenderEvent::DeviceNameUpdated("Kitchen".into()));
    let RenderEvent::PanelReady(panel) = &events[1] else {
        panic!("expected panel, got {:?}", events[1]);
    };
    assert_eq!(panel, &reference_panel());
    assert_eq!(panel.controls[0].cell, ControlCell::new(0, 0, 2, 1));
    assert_eq!(panel.controls[0].label, "A");
    assert_eq!(panel.controls[1].kind, ControlKind::Slider);
    assert_eq!(panel.controls[1].config.slider_min(), 0);
    assert_eq!(panel.controls[1].config.slider_max(), 100);
    assert_eq!(panel.controls[1].config.slider_initial(), 50);
    assert_eq!(panel.controls[1].label, "B");

    harness.handle.shutdown();
    assert_eq!(harness.finish().await, Ok(()));
}

#[tokio::test]
async fn test_mixed_panel_end_to_end() {
    let mut harness = Harness::with_defaults(SimulatedPeer::new().with_panel(&mixed_panel()));
    let panel = harness.expect_ready().await;

    assert_eq!(panel, mixed_panel());
    assert!(panel.is_landscape);
    assert!(!panel.controls[0].emits_events());
    assert!(panel.controls[1..].iter().all(ControlInfo::emits_events));
}

#[tokio::test]
async fn test_full_queue_defers_reads() {
    // Current-thread runtime: the session issues its whole batch before the
    // peer task gets to run, so a two-deep queue must overflow.
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .device_name("Kitchen")
        .queue_depth(2);
    let mut harness = Harness::with_defaults(peer);

    harness.expect_ready().await;
    let link = harness.link.clone();
    wait_until(|| link.reads_served().len() == 10).await;

    assert!(harness.link.rejected_requests() > 0);
    let served: HashSet<AttributeId> = harness.link.reads_served().into_iter().collect();
    assert_eq!(served.len(), 10, "every attribute read exactly once");
    assert!(!served.contains(&AttributeId::EventChannel));
}

#[tokio::test]
async fn test_interactions_reach_peer_in_order() {
    let mut harness = Harness::with_defaults(SimulatedPeer::new().with_panel(&reference_panel()));
    harness.expect_ready().await;

    harness.handle.report(OutgoingEvent::pressed(0)).unwrap();
    harness.handle.report(OutgoingEvent::released(0)).unwrap();
    harness
        .handle
        .report_interaction(1, EventKind::ValueChange, 300)
        .unwrap();

    let link = harness.link.clone();
    wait_until(|| link.written_frames().len() == 3).await;
    let handle = harness.handle.clone();
    wait_until(|| handle.pending_interactions() == 0).await;

    let frames = harness.link.written_frames();
    assert_eq!(frames[0], Bytes::from_static(&[1, 1, 1, 0, 0, 0, 0, 0]));
    assert_eq!(frames[1], Bytes::from_static(&[2, 1, 0, 0, 0, 0, 0, 0]));
    assert_eq!(frames[2], Bytes::from_static(&[2, 1, 0, 0, 1, 1, 0x2C, 0x01]));

    let slider = harness.link.last_event(1).unwrap();
    assert_eq!(slider.sequence, 1);
    assert_eq!(slider.kind, Some(EventKind::ValueChange));
    assert_eq!(slider.value, 300);
}

#[tokio::test]
async fn test_burst_of_interactions_serialized() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .latency(Duration::from_millis(1));
    let mut harness = Harness::with_defaults(peer);
    harness.expect_ready().await;

    for position in 0..20u16 {
        harness.handle.report(OutgoingEvent::slider_moved(1, position)).unwrap();
    }

    let link = harness.link.clone();
    wait_until(|| link.written_frames().len() == 20).await;

    // Exactly one increment per event, even though all were reported at once
    let sequences: Vec<u8> = harness.link.written_frames().iter().map(|f| f[4]).collect();
    assert_eq!(sequences, (1..=20).collect::<Vec<u8>>());
    assert_eq!(harness.link.last_event(1).unwrap().value, 19);
}

#[tokio::test]
async fn test_failed_write_resent_once() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .fail_writes(1);
    let mut harness = Harness::with_defaults(peer);
    harness.expect_ready().await;

    harness.handle.report(OutgoingEvent::pressed(0)).unwrap();

    let handle = harness.handle.clone();
    wait_until(|| handle.pending_interactions() == 0).await;
    let frames = harness.link.written_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][0], 1, "resend reuses the original sequence number");
}

#[tokio::test]
async fn test_malformed_descriptor_reported_once() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .with_attribute(AttributeId::ControlTypes, Bytes::from_static(&[2, 0x7F]));
    let mut harness = Harness::with_defaults(peer);

    let expected = RemoteError::Decode(DecodeError::UnknownKind(0x7F));
    assert_eq!(harness.expect_unavailable().await, expected);
    assert!(!harness.link.is_connected());

    let Harness { task, mut ui, handle, .. } = harness;
    assert_eq!(timeout(WAIT, task).await.unwrap().unwrap(), Err(expected));
    assert_eq!(ui.recv().await, None, "no further render events");
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_short_frames_blob_fails() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .with_attribute(AttributeId::Frames, Bytes::from_static(&[0, 0, 2, 1, 2, 0]));
    let mut harness = Harness::with_defaults(peer);

    assert!(matches!(
        harness.expect_unavailable().await,
        RemoteError::Decode(DecodeError::OutOfRange { field: "frames", .. })
    ));
}

#[tokio::test]
async fn test_missing_descriptor_attribute() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .without_attribute(AttributeId::Frames);
    let mut harness = Harness::with_defaults(peer);

    let expected = RemoteError::MissingAttributes(vec![AttributeId::Frames]);
    assert_eq!(harness.expect_unavailable().await, expected);
    assert_eq!(harness.finish().await, Err(expected));
}

#[tokio::test]
async fn test_short_names_get_configured_placeholder() {
    let config = SessionConfig::from_json(r#"{ "label_placeholder": "?" }"#).unwrap();
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .with_attribute(AttributeId::Names, Bytes::from_static(b"A"));
    let mut harness = Harness::start(peer, Session::builder(PeerId::new("sim")).config(config));

    let panel = harness.expect_ready().await;
    assert_eq!(panel.controls[0].label, "A");
    assert_eq!(panel.controls[1].label, "?");
}

#[tokio::test]
async fn test_peer_drops_mid_read() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .latency(Duration::from_millis(50));
    let mut harness = Harness::with_defaults(peer);

    let link = harness.link.clone();
    wait_until(|| link.is_connected()).await;
    harness.link.drop_connection();

    assert_eq!(
        harness.expect_unavailable().await,
        RemoteError::Transport(TransportError::Disconnected)
    );
    let handle = harness.handle.clone();
    assert_eq!(harness.finish().await, Ok(()));
    assert_eq!(
        handle.report(OutgoingEvent::pressed(0)),
        Err(RemoteError::SessionClosed)
    );
}

#[tokio::test]
async fn test_peer_drops_after_ready() {
    let mut harness = Harness::with_defaults(SimulatedPeer::new().with_panel(&reference_panel()));
    harness.expect_ready().await;

    harness.link.drop_connection();
    let Harness { task, mut ui, .. } = harness;
    assert_eq!(timeout(WAIT, task).await.unwrap().unwrap(), Ok(()));
    assert_eq!(ui.recv().await, None, "no unavailable after ready");
}

#[tokio::test]
async fn test_read_failures_retried() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .fail_reads(AttributeId::Names, 2);
    let mut harness = Harness::with_defaults(peer);

    let panel = harness.expect_ready().await;
    assert_eq!(panel.controls[1].label, "B");
}

#[tokio::test]
async fn test_read_failures_exhausted() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .fail_reads(AttributeId::Names, 5);
    let mut harness = Harness::start(peer, Session::builder(PeerId::new("sim")).read_retry_limit(1));

    assert_eq!(
        harness.expect_unavailable().await,
        RemoteError::Transport(TransportError::ReadFailed {
            attribute: AttributeId::Names,
            status: SIMULATED_FAILURE_STATUS,
        })
    );
}

#[tokio::test]
async fn test_refused_connection() {
    let mut harness = Harness::with_defaults(SimulatedPeer::new().refuse_connection());

    assert!(matches!(
        harness.expect_unavailable().await,
        RemoteError::Transport(TransportError::ConnectFailed(_))
    ));
    assert!(harness.finish().await.is_err());
}

#[tokio::test]
async fn test_missing_event_channel_rejects_interactions() {
    let peer = SimulatedPeer::new()
        .with_panel(&reference_panel())
        .without_attribute(AttributeId::EventChannel);
    let mut harness = Harness::with_defaults(peer);
    harness.expect_ready().await;

    assert!(matches!(
        harness.handle.report(OutgoingEvent::pressed(0)),
        Err(RemoteError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_shutdown_closes_handle() {
    let mut harness = Harness::with_defaults(SimulatedPeer::new().with_panel(&reference_panel()));
    harness.expect_ready().await;

    harness.handle.shutdown();
    let handle = harness.handle.clone();
    let link = harness.link.clone();
    assert_eq!(harness.finish().await, Ok(()));

    assert!(handle.is_closed());
    assert!(!link.is_connected());
    assert_eq!(
        handle.report_interaction(0, EventKind::ValueChange, 1),
        Err(RemoteError::SessionClosed)
    );
}
