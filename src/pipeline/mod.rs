pub mod relay;
pub mod timing;

pub use relay::Relay;
pub use timing::{FrameTimer, WindowReport};

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::{info, warn};

use crate::capture::{CaptureDevice, V4l2Session};
use crate::transport::{DryRun, FrameSink, HeaderRecord, SocketTransport};
use crate::{Config, DiagnosticsConfig, Result};

/// Bring a capture device and a sink up to the point where frames flow.
///
/// Order: negotiate format, allocate buffers, connect, send header, queue the
/// first slots, start streaming. Any device failure returns before `connect`
/// is called.
pub fn launch<D, S, C>(mut device: D, config: &Config, connect: C) -> Result<Relay<D, S>>
where
    D: CaptureDevice,
    S: FrameSink,
    C: FnOnce() -> Result<S>,
{
    let capture = &config.capture;
    let format = device.negotiate(capture.width, capture.height)?;
    device.allocate(capture.buffer_count)?;

    let header = HeaderRecord::new(
        &config.transport.brand,
        &config.transport.model,
        capture.fps,
        &format,
    );

    let mut sink = connect()?;
    sink.send_header(&header)?;

    let mut relay = Relay::new(device, sink);
    if let Some(timer) = frame_timer(&config.diagnostics) {
        relay = relay.with_timing(timer, config.diagnostics.inspect);
    }
    relay.prime()?;
    relay.source_mut().start()?;
    Ok(relay)
}

/// Window timer for the diagnostics in use. Frame inspection reports once
/// per window, so it brings the timer along even without `timing`.
fn frame_timer(diagnostics: &DiagnosticsConfig) -> Option<FrameTimer> {
    (diagnostics.timing || diagnostics.inspect).then(|| FrameTimer::new(diagnostics.window))
}

/// Run the V4L2 relay until `stop` is set. Blocks the calling thread.
pub fn run(config: &Config, device_path: &Path, stop: &AtomicBool) -> Result<u64> {
    let session = V4l2Session::open(device_path)?
        .strict_format(config.capture.strict_format)
        .stall_warning(Duration::from_millis(config.capture.stall_warning_ms));

    let transport = &config.transport;
    let mut relay = launch(session, config, || -> Result<Box<dyn FrameSink>> {
        if transport.dry_run {
            Ok(Box::new(DryRun::default()))
        } else {
            Ok(Box::new(SocketTransport::connect(&transport.socket_path)?))
        }
    })?;

    if let Some(core) = config.capture.pin_cpu {
        pin_to_core(core);
    }

    relay.run(stop)?;
    let frames = relay.finish()?;
    info!("Relayed {} frames", frames);
    Ok(frames)
}

fn pin_to_core(id: usize) {
    let core = core_affinity::get_core_ids()
        .unwrap_or_default()
        .into_iter()
        .find(|c| c.id == id);

    match core {
        Some(core) if core_affinity::set_for_current(core) => {
            info!("Capture loop pinned to CPU {}", id)
        }
        _ => warn!("Could not pin capture loop to CPU {}", id),
    }
}
