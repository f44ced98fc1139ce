//! Loopback demo - full session against a simulated peer.
//!
//! This example demonstrates:
//! - Starting a session with `Session::builder().start_with()`
//! - Receiving the assembled panel through `ChannelRenderer`
//! - Reporting button, switch and slider interactions
//! - Inspecting what the peer received via `PeerLink`
//!
//! ```text
//! RUST_LOG=lremote_client=debug cargo run --example loopback
//! ```

use std::time::Duration;

use lremote_client::transport::memory::SimulatedPeer;
use lremote_client::{
    ControlCell, ControlConfig, ControlInfo, ControlKind, OutgoingEvent, PanelDescriptor, PeerId,
    RenderEvent, Session,
};
use tracing_subscriber::EnvFilter;

fn demo_panel() -> PanelDescriptor {
    let control = |index: usize, kind, cell, config, label: &str| ControlInfo {
        index,
        kind,
        color_id: index as u8,
        cell,
        config,
        label: label.to_string(),
        render_handle: None,
    };

    PanelDescriptor {
        rows: 3,
        columns: 4,
        is_landscape: false,
        controls: vec![
            control(0, ControlKind::Label, ControlCell::new(0, 0, 4, 1), ControlConfig::default(), "Living Room"),
            control(1, ControlKind::PushButton, ControlCell::new(0, 1, 2, 1), ControlConfig::default(), "Blinds"),
            control(2, ControlKind::SwitchButton, ControlCell::new(2, 1, 2, 1), ControlConfig::default(), "Lamp"),
            control(3, ControlKind::Slider, ControlCell::new(0, 2, 4, 1), ControlConfig::new(0, 100, 40, 0), "Dimmer"),
        ],
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let peer = SimulatedPeer::new()
        .with_panel(&demo_panel())
        .device_name("LRemote Demo")
        .latency(Duration::from_millis(5));
    let link = peer.link();

    let (renderer, mut ui) = lremote_client::ChannelRenderer::new();
    let (handle, task) = Session::builder(PeerId::new("sim:loopback"))
        .start_with(|handle| peer.into_transport(handle), renderer);

    while let Some(event) = ui.recv().await {
        match event {
            RenderEvent::DeviceNameUpdated(name) => println!("device: {name}"),
            RenderEvent::PanelUnavailable(e) => {
                eprintln!("cannot render this device: {e}");
                break;
            }
            RenderEvent::PanelReady(panel) => {
                println!("{}x{} panel:", panel.columns, panel.rows);
                for c in &panel.controls {
                    println!(
                        "  #{} {:?} at ({},{}) {}x{} \"{}\"",
                        c.index, c.kind, c.cell.left, c.cell.top, c.cell.width, c.cell.height, c.label
                    );
                }

                handle.report(OutgoingEvent::pressed(1))?;
                handle.report(OutgoingEvent::released(1))?;
                handle.report(OutgoingEvent::toggled(2, true))?;
                handle.report(OutgoingEvent::slider_moved(3, 75))?;
                if let Err(e) = handle.report(OutgoingEvent::pressed(0)) {
                    println!("label rejected as expected: {e}");
                }
                break;
            }
        }
    }

    while handle.pending_interactions() > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for (i, frame) in link.written_frames().iter().enumerate() {
        println!("frame {i}: {:02x?}", &frame[..]);
    }

    handle.shutdown();
    task.await??;
    Ok(())
}
