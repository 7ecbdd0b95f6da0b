//! Double-buffered acquisition/transport loop

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, trace};

use crate::capture::{ActiveSlot, CaptureDevice, FrameSource, FrameStats};
use crate::error::{io_err, Error, Result};
use crate::pipeline::timing::{FrameTimer, WindowReport};
use crate::transport::FrameSink;

/// Moves frames from a capture source to a sink, one slot filling while the
/// previous one is sent.
///
/// Every step runs: dequeue the filled slot, queue the standby slot, send the
/// filled slot, keep it as the next standby. Queueing before sending lets the
/// driver fill the next frame while this one is on the wire. A slow sink only
/// delays the next dequeue; nothing is buffered in user space.
pub struct Relay<D, S> {
    source: D,
    sink: S,
    standby: Option<ActiveSlot>,
    timer: Option<FrameTimer>,
    inspect: bool,
    frames: u64,
}

impl<D: FrameSource, S: FrameSink> Relay<D, S> {
    pub fn new(source: D, sink: S) -> Self {
        Self {
            source,
            sink,
            standby: None,
            timer: None,
            inspect: false,
            frames: 0,
        }
    }

    /// Report achieved rate every window; with `inspect`, also the pixel
    /// range of the frame closing each window.
    pub fn with_timing(mut self, timer: FrameTimer, inspect: bool) -> Self {
        self.timer = Some(timer);
        self.inspect = inspect;
        self
    }

    /// Queue every slot but one to the driver and keep the last as standby.
    pub fn prime(&mut self) -> Result<()> {
        let mut slots = self.source.take_slots();
        if slots.len() < 2 {
            return Err(Error::BufferAllocationFailed {
                op: "prime",
                source: io_err(
                    std::io::ErrorKind::InvalidInput,
                    format!("double buffering needs 2 slots, have {}", slots.len()),
                ),
            });
        }

        self.standby = slots.pop();
        for slot in slots {
            debug!("Queueing slot {}", slot.index());
            self.source.enqueue(slot)?;
        }
        Ok(())
    }

    /// Relay exactly one frame.
    pub fn step(&mut self) -> Result<()> {
        let filled = self.source.dequeue()?;
        if let Some(next) = self.standby.take() {
            self.source.enqueue(next)?;
        }

        let frame = self.source.frame(&filled);
        self.sink.send_frame(frame)?;
        self.frames += 1;
        metrics::counter!("relay_frames_total").increment(1);
        trace!("Sent frame {} from slot {}", self.frames, filled.index());

        if let Some(report) = self.timer.as_mut().and_then(FrameTimer::tick) {
            log_window(&report, frame, self.inspect);
        }

        self.standby = Some(filled.recycle());
        Ok(())
    }

    /// Relay frames until `stop` is set. The flag is checked between frames,
    /// so a frame in flight is always finished.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<u64> {
        info!("Relaying frames");
        while !stop.load(Ordering::Relaxed) {
            self.step()?;
        }
        info!("Stop requested after {} frames", self.frames);
        Ok(self.frames)
    }

    /// Frames sent so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut D {
        &mut self.source
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (D, S) {
        (self.source, self.sink)
    }
}

impl<D: CaptureDevice, S: FrameSink> Relay<D, S> {
    /// Stop the capture session. Returns the number of frames relayed.
    pub fn finish(self) -> Result<u64> {
        let frames = self.frames;
        self.source.stop()?;
        Ok(frames)
    }
}

fn log_window(report: &WindowReport, frame: &[u8], inspect: bool) {
    info!(
        "{} frames in {:?}: {:.2} fps, {:.0} us/frame",
        report.frames, report.elapsed, report.fps, report.avg_frame_us
    );
    metrics::gauge!("relay_fps").set(report.fps);

    if inspect {
        if let Some(stats) = FrameStats::from_y16(frame) {
            info!("Frame range: min={} max={}", stats.min, stats.max);
        }
    }
}
