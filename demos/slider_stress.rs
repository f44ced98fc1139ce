//! Slider stress demo - a flood of slider moves through a congested link.
//!
//! The simulated peer has a two-request queue, injected write failures and
//! per-request latency. Every move still reaches the peer exactly once, in
//! order, with one sequence increment each.
//!
//! ```text
//! cargo run --example slider_stress -- 500
//! ```

use std::time::{Duration, Instant};

use lremote_client::transport::memory::SimulatedPeer;
use lremote_client::{
    ChannelRenderer, ControlCell, ControlConfig, ControlInfo, ControlKind, OutgoingEvent,
    PanelDescriptor, PeerId, RemoteError, RenderEvent, Session,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let moves: u16 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(200);

    let panel = PanelDescriptor {
        rows: 1,
        columns: 1,
        is_landscape: true,
        controls: vec![ControlInfo {
            index: 0,
            kind: ControlKind::Slider,
            color_id: 3,
            cell: ControlCell::new(0, 0, 1, 1),
            config: ControlConfig::new(0, u16::MAX, 0, 0),
            label: "Throttle".into(),
            render_handle: None,
        }],
    };

    let peer = SimulatedPeer::new()
        .with_panel(&panel)
        .queue_depth(2)
        .latency(Duration::from_micros(200))
        .fail_writes(2);
    let link = peer.link();

    let (renderer, mut ui) = ChannelRenderer::new();
    let (handle, task) = Session::builder(PeerId::new("sim:stress"))
        .max_pending_interactions(32)
        .retry_interval(Duration::from_millis(10))
        .start_with(|handle| peer.into_transport(handle), renderer);

    match ui.recv().await {
        Some(RenderEvent::PanelReady(_)) => {}
        other => return Err(format!("no panel: {other:?}").into()),
    }

    let started = Instant::now();
    let mut busy = 0u32;
    for position in 0..moves {
        loop {
            match handle.report(OutgoingEvent::slider_moved(0, position)) {
                Ok(()) => break,
                Err(RemoteError::Busy) => {
                    busy += 1;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    while handle.pending_interactions() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let frames = link.written_frames();
    let last = link.last_event(0);
    println!(
        "{} moves delivered in {:?} ({} busy retries, {} rejected requests)",
        frames.len(),
        started.elapsed(),
        busy,
        link.rejected_requests()
    );
    if let Some(record) = last {
        println!("final slot: seq={} value={}", record.sequence, record.value);
    }

    handle.shutdown();
    task.await??;
    Ok(())
}
